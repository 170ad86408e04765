//! Quote structures: raw as delivered by a connector, and normalized.
//!
//! # Timestamp convention
//!
//! `timestamp_us` / `raw_timestamp_us` are wall-clock **microseconds since
//! Unix epoch**. `normalized_time` is a per-instrument logical clock in
//! **seconds** derived from the monotonic clock, so it is comparable across
//! exchanges without wall-clock skew.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RawPriceData
// ---------------------------------------------------------------------------

/// A best bid/ask quote exactly as produced by an exchange connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPriceData {
    pub exchange: String,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp_us: u64,
}

impl RawPriceData {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        bid: Decimal,
        ask: Decimal,
        timestamp_us: u64,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            bid,
            ask,
            timestamp_us,
        }
    }

    /// Key of the instrument this quote belongs to.
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(&self.exchange, &self.symbol)
    }
}

// ---------------------------------------------------------------------------
// NormalizedPriceData
// ---------------------------------------------------------------------------

/// A quote that passed validation, with prices rounded to 8 fractional digits
/// and a per-instrument monotonic `normalized_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPriceData {
    pub exchange: String,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub raw_timestamp_us: u64,
    pub normalized_time: f64,
}

impl NormalizedPriceData {
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(&self.exchange, &self.symbol)
    }
}

// ---------------------------------------------------------------------------
// InstrumentKey
// ---------------------------------------------------------------------------

/// `(exchange, symbol)` pair identifying one instrument feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentKey {
    pub exchange: String,
    pub symbol: String,
}

impl InstrumentKey {
    pub fn new(exchange: &str, symbol: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

impl std::fmt::Display for RawPriceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Raw({}:{} bid={} ask={} ts={}us)",
            self.exchange, self.symbol, self.bid, self.ask, self.timestamp_us
        )
    }
}

impl std::fmt::Display for NormalizedPriceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Quote({}:{} bid={} ask={} t={:.6}s)",
            self.exchange, self.symbol, self.bid, self.ask, self.normalized_time
        )
    }
}
