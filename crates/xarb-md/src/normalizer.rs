//! Quote normalizer.
//!
//! Turns a [`RawPriceData`] into a [`NormalizedPriceData`] or rejects it:
//!
//! 1. reject crossed (`ask < bid`) or non-positive prices,
//! 2. reject quotes older than `stale_interval`,
//! 3. round bid/ask to 8 fractional digits, half-up,
//! 4. stamp a per-instrument `normalized_time` that is at least
//!    `minimum_gap` seconds after the previous one for the same
//!    `(exchange, symbol)`, even when the monotonic clock stalls.
//!
//! The monotonic clock is read only for quotes that pass 1–2, so rejected
//! quotes leave the sequencing state untouched.

use std::time::Duration;

use ahash::AHashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;
use tracing::debug;
use xarb_core::config::NormalizerConfig;
use xarb_core::error::ArbitrageError;
use xarb_core::time_util::{
    MonotonicClock, WallClock, system_monotonic_clock, system_wall_clock,
};
use xarb_core::{InstrumentKey, NormalizedPriceData, RawPriceData};

/// Fractional digits kept on normalized prices.
pub const PRICE_SCALE: u32 = 8;

/// Round a price to [`PRICE_SCALE`] digits, half-up, and pad it to exactly
/// that scale.
#[inline]
pub fn round_price(price: Decimal) -> Decimal {
    let mut rounded =
        price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

/// Smallest `f64` greater than `x` (finite `x`).
fn next_up(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 { f64::from_bits(bits + 1) } else { f64::from_bits(bits - 1) }
}

/// Canonicalizes raw quotes. Safe to share between ingestion tasks.
pub struct ExchangeNormalizer {
    config: NormalizerConfig,
    wall_clock: WallClock,
    monotonic_clock: MonotonicClock,
    last_normalized: Mutex<AHashMap<InstrumentKey, f64>>,
}

impl ExchangeNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_clocks(config, system_wall_clock(), system_monotonic_clock())
    }

    /// Create a normalizer with injected clocks (for deterministic tests).
    pub fn with_clocks(
        config: NormalizerConfig,
        wall_clock: WallClock,
        monotonic_clock: MonotonicClock,
    ) -> Self {
        Self {
            config,
            wall_clock,
            monotonic_clock,
            last_normalized: Mutex::new(AHashMap::new()),
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize `raw`, or `None` if it is invalid or stale.
    pub async fn normalize(&self, raw: &RawPriceData) -> Option<NormalizedPriceData> {
        match self.try_normalize(raw).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                debug!("[normalizer] dropped {raw}: {e}");
                None
            }
        }
    }

    /// Like [`normalize`](Self::normalize), but reports why a quote was
    /// rejected (`InvalidFormat` or `StaleData`).
    pub async fn try_normalize(
        &self,
        raw: &RawPriceData,
    ) -> Result<NormalizedPriceData, ArbitrageError> {
        if raw.ask < raw.bid {
            return Err(ArbitrageError::InvalidFormat {
                exchange: raw.exchange.clone(),
                detail: format!("{} crossed quote bid={} > ask={}", raw.symbol, raw.bid, raw.ask),
            });
        }
        if raw.bid <= Decimal::ZERO || raw.ask <= Decimal::ZERO {
            return Err(ArbitrageError::InvalidFormat {
                exchange: raw.exchange.clone(),
                detail: format!(
                    "{} non-positive price bid={} ask={}",
                    raw.symbol, raw.bid, raw.ask
                ),
            });
        }

        let now_us = (self.wall_clock)();
        let age = Duration::from_micros(now_us.saturating_sub(raw.timestamp_us));
        if age > self.config.stale_interval {
            return Err(ArbitrageError::StaleData {
                exchange: raw.exchange.clone(),
                symbol: raw.symbol.clone(),
                age,
            });
        }

        let bid = round_price(raw.bid);
        let ask = round_price(raw.ask);

        let normalized_time = {
            let mut last = self.last_normalized.lock().await;
            let candidate = (self.monotonic_clock)();
            let key = raw.key();
            let normalized_time = match last.get(&key) {
                Some(&prev) => {
                    // A gap below the f64 spacing at `prev` would round away.
                    let floor = prev + self.config.minimum_gap;
                    let floor = if floor > prev { floor } else { next_up(prev) };
                    candidate.max(floor)
                }
                None => candidate,
            };
            last.insert(key, normalized_time);
            normalized_time
        };

        Ok(NormalizedPriceData {
            exchange: raw.exchange.clone(),
            symbol: raw.symbol.clone(),
            bid,
            ask,
            raw_timestamp_us: raw.timestamp_us,
            normalized_time,
        })
    }

    /// Last normalized time issued for `(exchange, symbol)`, if any.
    pub async fn last_normalized_time(&self, exchange: &str, symbol: &str) -> Option<f64> {
        self.last_normalized
            .lock()
            .await
            .get(&InstrumentKey::new(exchange, symbol))
            .copied()
    }
}

impl Default for ExchangeNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}
