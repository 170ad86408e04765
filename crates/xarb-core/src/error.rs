//! Typed error definitions for the spread detection pipeline.
//!
//! [`ArbitrageError`] is the system-wide taxonomy (connection, data and logic
//! errors). [`IngestionError`] is the terminal error surfaced on a normalized
//! quote stream, and [`ConnectorError`] is what exchange connectors return
//! before exchange/symbol context is attached. All variants carry structured
//! fields so they can be logged without string parsing, and all implement
//! `std::error::Error` via `thiserror`, so they integrate with `anyhow::Result`.

use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Domain-specific errors for the arbitrage core.
#[derive(Debug, Error)]
pub enum ArbitrageError {
    // --- Connection ---
    /// The circuit breaker guarding `exchange` refused the attempt.
    #[error("circuit breaker open for {exchange} after {failure_count} failure(s)")]
    CircuitBreakerOpen { exchange: String, failure_count: u32 },

    /// Subscribing to one or more pairs was rejected.
    #[error("subscription to [{}] on {exchange} failed: {reason}", .pairs.join(", "))]
    SubscriptionFailed {
        exchange: String,
        pairs: Vec<String>,
        reason: String,
    },

    /// WebSocket protocol-level error reported by a connector.
    #[error("websocket error on {exchange} (code {code}): {reason}")]
    WebSocket {
        exchange: String,
        code: u16,
        reason: String,
    },

    // --- Data ---
    /// Quote content that cannot be used (crossed or non-positive prices).
    #[error("invalid data from {exchange}: {detail}")]
    InvalidFormat { exchange: String, detail: String },

    /// Quote older than the configured staleness window.
    #[error("stale {symbol} quote from {exchange}: age {age:?}")]
    StaleData {
        exchange: String,
        symbol: String,
        age: Duration,
    },

    // --- Logic ---
    /// Configuration parsing or validation error.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Not enough balance for a trade. Produced by downstream executors.
    #[error("insufficient {asset} balance on {exchange}: required {required}, available {available}")]
    InsufficientBalance {
        exchange: String,
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    /// Terminal error from an ingestion stream.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

/// Terminal error on a normalized price stream.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The connector's feed broke after it had been established.
    #[error("connection to {exchange} lost: {reason}")]
    ConnectionLost { exchange: String, reason: String },

    /// The connector could not connect at all.
    #[error("connection to {exchange} failed: {reason}")]
    ConnectionFailed { exchange: String, reason: String },

    /// Subscribing to `symbol` failed. The connector's own error is kept as
    /// the source.
    #[error("subscription to {symbol} on {exchange} failed: {reason}")]
    SubscriptionFailed {
        exchange: String,
        symbol: String,
        reason: String,
        #[source]
        source: Option<ConnectorError>,
    },
}

impl IngestionError {
    /// Exchange the error originated from.
    pub fn exchange(&self) -> &str {
        match self {
            Self::ConnectionLost { exchange, .. }
            | Self::ConnectionFailed { exchange, .. }
            | Self::SubscriptionFailed { exchange, .. } => exchange,
        }
    }
}

/// Error returned by an exchange connector. Carries only the reason; callers
/// attach exchange and symbol context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// Establishing the connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The exchange rejected a request (e.g. unknown pair).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The connection or feed was closed.
    #[error("closed: {0}")]
    Closed(String),

    /// Local I/O error (reading a replay file, socket error).
    #[error("io: {0}")]
    Io(String),
}

impl ConnectorError {
    /// The reason text without the kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Connect(r) | Self::Rejected(r) | Self::Closed(r) | Self::Io(r) => r,
        }
    }
}
