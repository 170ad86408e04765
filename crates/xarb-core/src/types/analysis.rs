//! Spread analysis emitted by the detector.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best cross-exchange buy/sell pair for one symbol at the moment of an
/// ingest, with its profitability verdict.
///
/// `buy_price` is the buy exchange's ask and `sell_price` the sell exchange's
/// bid. `spread_percentage` is a fraction (`0.015` means 1.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadAnalysis {
    pub symbol: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub spread_percentage: Decimal,
    pub latency_ms: f64,
    pub is_profitable: bool,
}

impl std::fmt::Display for SpreadAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Spread({} buy {}@{} sell {}@{} spread={} latency={:.3}ms profitable={})",
            self.symbol,
            self.buy_exchange,
            self.buy_price,
            self.sell_exchange,
            self.sell_price,
            self.spread_percentage,
            self.latency_ms,
            self.is_profitable
        )
    }
}
