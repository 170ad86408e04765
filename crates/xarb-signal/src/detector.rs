//! Spread detector. Keeps the latest quote per (exchange, symbol) and, on
//! every ingest, emits the best cross-exchange buy/sell pair for that symbol.
//!
//! Ingests are serialized by one async mutex covering the table update, the
//! selection and the send, so analyses leave the detector in ingest order.
//!
//! The analysis channel is only opened by [`SpreadDetector::analysis_stream`];
//! analyses produced before that are discarded, not queued.

use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, trace};
use xarb_core::config::DetectorConfig;
use xarb_core::{NormalizedPriceData, SpreadAnalysis};

/// Consumer end of the detector's analyses. Ends once the detector is
/// dropped.
pub type AnalysisStream = BoxStream<'static, SpreadAnalysis>;

struct DetectorState {
    /// symbol → latest quote per exchange, in first-insertion order.
    table: AHashMap<String, Vec<NormalizedPriceData>>,
    consumer_gone: bool,
}

pub struct SpreadDetector {
    config: DetectorConfig,
    state: Mutex<DetectorState>,
    /// `None` until a consumer takes the stream.
    tx: parking_lot::Mutex<Option<UnboundedSender<SpreadAnalysis>>>,
    stream_taken: AtomicBool,
}

impl SpreadDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DetectorState {
                table: AHashMap::new(),
                consumer_gone: false,
            }),
            tx: parking_lot::Mutex::new(None),
            stream_taken: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The analysis stream. Handed out once; `None` on later calls. Only
    /// analyses from ingests after this call are delivered.
    pub fn analysis_stream(&self) -> Option<AnalysisStream> {
        if self.stream_taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = unbounded_channel();
        *self.tx.lock() = Some(tx);
        Some(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|a| (a, rx)) }).boxed())
    }

    /// Snapshot of the stored quotes for `symbol`, in first-insertion order.
    pub async fn quotes_for(&self, symbol: &str) -> Vec<NormalizedPriceData> {
        let state = self.state.lock().await;
        state.table.get(symbol).cloned().unwrap_or_default()
    }

    /// Store `quote` and emit the resulting analysis, if the symbol is now
    /// quoted by at least two exchanges.
    pub async fn ingest(&self, quote: NormalizedPriceData) {
        let mut state = self.state.lock().await;

        let entries = state.table.entry(quote.symbol.clone()).or_default();
        match entries.iter_mut().find(|q| q.exchange == quote.exchange) {
            Some(slot) => *slot = quote.clone(),
            None => entries.push(quote.clone()),
        }

        let Some(analysis) = self.evaluate(&quote.symbol, entries) else {
            return;
        };
        trace!("emit {analysis}");

        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(analysis).is_ok(),
            None => return,
        };
        if !sent && !state.consumer_gone {
            state.consumer_gone = true;
            debug!("analysis consumer dropped, discarding further analyses");
        }
    }

    fn evaluate(&self, symbol: &str, entries: &[NormalizedPriceData]) -> Option<SpreadAnalysis> {
        let mut buy: Option<&NormalizedPriceData> = None;
        let mut sell: Option<&NormalizedPriceData> = None;
        let mut candidates = 0usize;

        // Strict comparisons: on ties the earlier entry stays.
        for q in entries {
            let buyable = q.ask > Decimal::ZERO;
            let sellable = q.bid > Decimal::ZERO;
            if buyable || sellable {
                candidates += 1;
            }
            if buyable && buy.is_none_or(|b| q.ask < b.ask) {
                buy = Some(q);
            }
            if sellable && sell.is_none_or(|s| q.bid > s.bid) {
                sell = Some(q);
            }
        }

        if candidates < 2 {
            return None;
        }
        let (buy, sell) = (buy?, sell?);

        let buy_price = buy.ask;
        let sell_price = sell.bid;
        let Some(spread_percentage) = (sell_price - buy_price).checked_div(buy_price) else {
            debug!("[{symbol}] spread out of range for buy {buy_price} sell {sell_price}");
            return None;
        };
        let latency_ms = (buy.normalized_time - sell.normalized_time).abs() * 1000.0;
        let is_profitable = spread_percentage >= self.config.minimum_spread_percentage
            && latency_ms <= self.config.maximum_latency_ms;

        Some(SpreadAnalysis {
            symbol: symbol.to_string(),
            buy_exchange: buy.exchange.clone(),
            sell_exchange: sell.exchange.clone(),
            buy_price,
            sell_price,
            spread_percentage,
            latency_ms,
            is_profitable,
        })
    }
}

impl Default for SpreadDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use rust_decimal_macros::dec;

    fn quote(exchange: &str, symbol: &str, bid: Decimal, ask: Decimal, t: f64) -> NormalizedPriceData {
        NormalizedPriceData {
            exchange: exchange.into(),
            symbol: symbol.into(),
            bid,
            ask,
            raw_timestamp_us: 0,
            normalized_time: t,
        }
    }

    async fn next(stream: &mut AnalysisStream) -> SpreadAnalysis {
        stream.next().await.unwrap()
    }

    #[tokio::test]
    async fn worked_example() {
        let d = SpreadDetector::default();
        let mut out = d.analysis_stream().unwrap();

        d.ingest(quote("Binance", "BTC-USD", dec!(99.00), dec!(100.00), 1.0)).await;
        d.ingest(quote("Coinbase", "BTC-USD", dec!(101.50), dec!(102.00), 1.1)).await;

        let a = next(&mut out).await;
        assert_eq!(a.symbol, "BTC-USD");
        assert_eq!(a.buy_exchange, "Binance");
        assert_eq!(a.sell_exchange, "Coinbase");
        assert_eq!(a.buy_price, dec!(100.00));
        assert_eq!(a.sell_price, dec!(101.50));
        assert_eq!(a.spread_percentage, dec!(0.015));
        assert!((a.latency_ms - 100.0).abs() < 1e-6);
        assert!(a.is_profitable);
    }

    #[tokio::test]
    async fn single_exchange_emits_nothing() {
        let d = SpreadDetector::default();
        let mut out = d.analysis_stream().unwrap();

        d.ingest(quote("Binance", "BTC-USD", dec!(99), dec!(100), 0.0)).await;
        d.ingest(quote("Binance", "BTC-USD", dec!(98), dec!(99), 0.1)).await;
        // Other symbols do not pair with BTC-USD.
        d.ingest(quote("Coinbase", "ETH-USD", dec!(9), dec!(10), 0.1)).await;
        drop(d);

        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn nothing_buffered_before_a_consumer_attaches() {
        let d = SpreadDetector::default();
        d.ingest(quote("A", "X", dec!(99), dec!(100), 0.0)).await;
        for _ in 0..10_000 {
            d.ingest(quote("B", "X", dec!(101), dec!(102), 0.0)).await;
        }

        let mut out = d.analysis_stream().unwrap();
        d.ingest(quote("B", "X", dec!(103), dec!(104), 0.0)).await;
        drop(d);

        assert_eq!(next(&mut out).await.sell_price, dec!(103));
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_handed_out_once() {
        let d = SpreadDetector::default();
        assert!(d.analysis_stream().is_some());
        assert!(d.analysis_stream().is_none());
    }

    #[tokio::test]
    async fn profitability_boundaries() {
        let d = SpreadDetector::new(DetectorConfig {
            minimum_spread_percentage: dec!(0.001),
            maximum_latency_ms: 250.0,
        });
        let mut out = d.analysis_stream().unwrap();

        // Exactly at both thresholds.
        d.ingest(quote("A", "X", dec!(999), dec!(1000), 0.0)).await;
        d.ingest(quote("B", "X", dec!(1001), dec!(1002), 0.25)).await;
        let a = next(&mut out).await;
        assert_eq!(a.spread_percentage, dec!(0.001));
        assert_eq!(a.latency_ms, 250.0);
        assert!(a.is_profitable);

        // Latency just over.
        d.ingest(quote("B", "X", dec!(1001), dec!(1002), 0.251)).await;
        let a = next(&mut out).await;
        assert!(a.latency_ms > 250.0);
        assert!(!a.is_profitable);

        // Spread just under.
        d.ingest(quote("B", "X", dec!(1000.9), dec!(1002), 0.0)).await;
        let a = next(&mut out).await;
        assert!(a.spread_percentage < dec!(0.001));
        assert!(!a.is_profitable);
    }

    #[tokio::test]
    async fn non_positive_prices_are_not_candidates() {
        let d = SpreadDetector::default();
        let mut out = d.analysis_stream().unwrap();

        d.ingest(quote("A", "X", dec!(0), dec!(0), 0.0)).await;
        d.ingest(quote("B", "X", dec!(99), dec!(100), 0.0)).await;
        // A has no usable side, so only one exchange counts.
        d.ingest(quote("C", "X", dec!(101), dec!(0), 0.0)).await;

        let a = next(&mut out).await;
        assert_eq!(a.buy_exchange, "B");
        assert_eq!(a.sell_exchange, "C");
        assert_eq!(a.sell_price, dec!(101));

        // The zero quote stays stored.
        let stored = d.quotes_for("X").await;
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].exchange, "A");
    }

    #[tokio::test]
    async fn identical_reingest_reemits() {
        let d = SpreadDetector::default();
        let mut out = d.analysis_stream().unwrap();

        d.ingest(quote("A", "X", dec!(99), dec!(100), 0.0)).await;
        let b = quote("B", "X", dec!(101), dec!(102), 0.0);
        d.ingest(b.clone()).await;
        d.ingest(b).await;

        let first = next(&mut out).await;
        let second = next(&mut out).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ties_go_to_first_inserted() {
        let d = SpreadDetector::default();
        let mut out = d.analysis_stream().unwrap();

        d.ingest(quote("A", "X", dec!(99), dec!(100), 0.0)).await;
        d.ingest(quote("B", "X", dec!(99), dec!(100), 0.0)).await;
        let a = next(&mut out).await;
        assert_eq!(a.buy_exchange, "A");
        assert_eq!(a.sell_exchange, "A");
        assert_eq!(a.spread_percentage, dec!(-0.01));
        assert!(!a.is_profitable);

        // Updating A in place keeps its position.
        d.ingest(quote("A", "X", dec!(99), dec!(100), 0.1)).await;
        let a = next(&mut out).await;
        assert_eq!(a.buy_exchange, "A");
        let stored = d.quotes_for("X").await;
        assert_eq!(stored[0].exchange, "A");
        assert_eq!(stored[0].normalized_time, 0.1);
    }

    #[tokio::test]
    async fn analyses_follow_ingest_order() {
        let d = SpreadDetector::default();
        let mut out = d.analysis_stream().unwrap();

        d.ingest(quote("A", "X", dec!(99), dec!(100), 0.0)).await;
        for i in 1..=5u32 {
            d.ingest(quote("B", "X", Decimal::from(100 + i), dec!(200), 0.0)).await;
        }
        for i in 1..=5u32 {
            assert_eq!(next(&mut out).await.sell_price, Decimal::from(100 + i));
        }
    }

    #[tokio::test]
    async fn dropped_consumer_does_not_fail_ingest() {
        let d = SpreadDetector::default();
        drop(d.analysis_stream());
        d.ingest(quote("A", "X", dec!(99), dec!(100), 0.0)).await;
        d.ingest(quote("B", "X", dec!(101), dec!(102), 0.0)).await;
        d.ingest(quote("B", "X", dec!(101), dec!(102), 0.0)).await;
        assert_eq!(d.quotes_for("X").await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingests() {
        let d = Arc::new(SpreadDetector::default());
        let mut out = d.analysis_stream().unwrap();
        d.ingest(quote("seed", "X", dec!(1), dec!(1000), 0.0)).await;

        let mut handles = Vec::new();
        for ex in ["A", "B", "C", "D"] {
            let d = d.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25u32 {
                    d.ingest(quote(ex, "X", Decimal::from(i + 1), Decimal::from(i + 2), 0.0))
                        .await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for _ in 0..100 {
            next(&mut out).await;
        }
        let stored = d.quotes_for("X").await;
        assert_eq!(stored.len(), 5);
        assert!(stored[1..].iter().all(|q| q.ask == dec!(26)));
    }
}
