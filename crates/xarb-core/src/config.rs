//! Configuration parsing for the spread detection system.
//!
//! Everything is read from a single JSON file. Each section is optional and
//! falls back to its defaults; only `symbols` and `connections` must be
//! non-empty.
//!
//! # Example config
//!
//! ```json
//! {
//!   "module": { "module_name": "xarb", "log_path": "/tmp/log" },
//!   "symbols": ["BTC-USD"],
//!   "detector": { "minimum_spread_percentage": "0.002", "maximum_latency_ms": 150 },
//!   "normalizer": { "stale_interval_ms": 5000, "minimum_gap_sec": 0.000001 },
//!   "circuit_breaker": { "failure_threshold": 5, "timeout_ms": 30000, "success_threshold": 2 },
//!   "connections": [
//!     { "exchange": "binance", "kind": "replay", "replay_path": "data/binance.jsonl" },
//!     { "exchange": "coinbase", "kind": "replay", "replay_path": "data/coinbase.jsonl" }
//!   ]
//! }
//! ```

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ArbitrageError;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub module: Option<ModuleMeta>,

    /// Symbols to watch on every connection (e.g. `["BTC-USD"]`).
    pub symbols: Vec<String>,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// One entry per exchange connector.
    pub connections: Vec<ConnectionConfig>,
}

impl AppConfig {
    /// Module name from the metadata block, defaulting to `"xarb"`.
    pub fn module_name(&self) -> String {
        self.module
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "xarb".to_string())
    }

    pub fn log_path(&self) -> Option<String> {
        self.module.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Check thresholds and required lists.
    pub fn validate(&self) -> Result<(), ArbitrageError> {
        if self.symbols.is_empty() {
            return Err(ArbitrageError::InvalidConfiguration("symbols must not be empty".into()));
        }
        if self.connections.is_empty() {
            return Err(ArbitrageError::InvalidConfiguration(
                "connections must not be empty".into(),
            ));
        }
        for conn in &self.connections {
            conn.validate()?;
        }
        self.detector.validate()?;
        self.normalizer.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Kind of connector to build for a connection entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// Replays quotes from a JSON-lines file.
    Replay,
}

/// A single exchange connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Exchange identifier, e.g. `"binance"`.
    pub exchange: String,

    pub kind: ConnectorKind,

    /// JSON-lines quote file (replay connectors).
    pub replay_path: Option<String>,

    /// Delay between replayed quotes in milliseconds (default: 0).
    pub replay_interval_ms: Option<u64>,

    /// Replace file timestamps with the current time on emission (default: true).
    pub restamp: Option<bool>,

    /// Maximum connect attempts before giving up (default: 10).
    pub max_connect_attempts: Option<u32>,
}

impl ConnectionConfig {
    pub fn effective_replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms.unwrap_or(0))
    }

    pub fn effective_restamp(&self) -> bool {
        self.restamp.unwrap_or(true)
    }

    pub fn effective_max_connect_attempts(&self) -> u32 {
        self.max_connect_attempts.unwrap_or(10)
    }

    fn validate(&self) -> Result<(), ArbitrageError> {
        if self.exchange.trim().is_empty() {
            return Err(ArbitrageError::InvalidConfiguration(
                "connection exchange must not be empty".into(),
            ));
        }
        if self.kind == ConnectorKind::Replay && self.replay_path.is_none() {
            return Err(ArbitrageError::InvalidConfiguration(format!(
                "replay connection for {} needs replay_path",
                self.exchange
            )));
        }
        Ok(())
    }
}

/// Spread detector thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum `(sell - buy) / buy` for an analysis to be profitable.
    pub minimum_spread_percentage: Decimal,
    /// Maximum normalized-time distance between the two legs.
    pub maximum_latency_ms: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            minimum_spread_percentage: Decimal::new(1, 3),
            maximum_latency_ms: 250.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ArbitrageError> {
        if !self.maximum_latency_ms.is_finite() || self.maximum_latency_ms < 0.0 {
            return Err(ArbitrageError::InvalidConfiguration(
                "detector.maximum_latency_ms must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// Quote normalizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Maximum age of a quote's wall-clock timestamp.
    #[serde(rename = "stale_interval_ms", deserialize_with = "duration_from_ms")]
    pub stale_interval: Duration,
    /// Minimum spacing of normalized times per instrument, in seconds.
    #[serde(rename = "minimum_gap_sec")]
    pub minimum_gap: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            stale_interval: Duration::from_secs(5),
            minimum_gap: 0.000_001,
        }
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> Result<(), ArbitrageError> {
        if !self.minimum_gap.is_finite() || self.minimum_gap <= 0.0 {
            return Err(ArbitrageError::InvalidConfiguration(
                "normalizer.minimum_gap_sec must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn duration_from_ms<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

/// Parse a JSON config string.
pub fn parse_config(content: &str) -> anyhow::Result<AppConfig> {
    let config: AppConfig = serde_json::from_str(content)?;
    Ok(config)
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
