//! Task wiring between connectors, ingestion and the detector.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use xarb_core::error::IngestionError;
use xarb_md::ExchangeConnector;
use xarb_md::event::{ConnectionEvent, ConnectionEventReceiver};
use xarb_md::ingestion::{ExchangeDataIngestion, NormalizedPriceStream};
use xarb_signal::{AnalysisStream, SpreadDetector};

/// Outcome of one (connector, symbol) feed.
#[derive(Debug)]
pub struct FeedSummary {
    pub exchange: String,
    pub symbol: String,
    pub quotes: u64,
    pub error: Option<IngestionError>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTally {
    pub total: u64,
    pub profitable: u64,
}

/// Forward every normalized quote of `stream` into `detector`.
pub async fn run_feed(
    mut stream: NormalizedPriceStream,
    detector: Arc<SpreadDetector>,
    exchange: String,
    symbol: String,
) -> FeedSummary {
    let mut quotes = 0u64;
    let mut error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(quote) => {
                detector.ingest(quote).await;
                quotes += 1;
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }
    FeedSummary {
        exchange,
        symbol,
        quotes,
        error,
    }
}

/// One feed task per (connector, symbol).
pub fn spawn_feeds(
    connectors: &[Arc<dyn ExchangeConnector>],
    symbols: &[String],
    ingestion: &ExchangeDataIngestion,
    detector: &Arc<SpreadDetector>,
) -> JoinSet<FeedSummary> {
    let mut feeds = JoinSet::new();
    for connector in connectors {
        for symbol in symbols {
            let stream = ingestion.normalized_price_stream(connector.clone(), symbol.clone());
            feeds.spawn(run_feed(
                stream,
                detector.clone(),
                connector.exchange().to_string(),
                symbol.clone(),
            ));
        }
    }
    feeds
}

/// Wait for every feed to finish, logging each outcome.
pub async fn wait_feeds(feeds: &mut JoinSet<FeedSummary>) -> Vec<FeedSummary> {
    let mut done = Vec::new();
    while let Some(joined) = feeds.join_next().await {
        match joined {
            Ok(summary) => {
                match &summary.error {
                    Some(e) => warn!(
                        "[{}] {} feed ended after {} quote(s): {e}",
                        summary.exchange, summary.symbol, summary.quotes
                    ),
                    None => info!(
                        "[{}] {} feed ended after {} quote(s)",
                        summary.exchange, summary.symbol, summary.quotes
                    ),
                }
                done.push(summary);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("feed task failed: {e}"),
        }
    }
    done
}

/// Log every analysis until the detector goes away.
pub async fn log_analyses(mut analyses: AnalysisStream) -> AnalysisTally {
    let mut tally = AnalysisTally::default();
    while let Some(analysis) = analyses.next().await {
        tally.total += 1;
        if analysis.is_profitable {
            tally.profitable += 1;
            info!("PROFITABLE {analysis}");
        } else {
            debug!("{analysis}");
        }
    }
    tally
}

pub async fn log_events(mut events: ConnectionEventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Connected { exchange } => info!("[{exchange}] connected"),
            ConnectionEvent::Disconnected { exchange, reason } => {
                info!("[{exchange}] disconnected: {reason}")
            }
            ConnectionEvent::Reconnecting { exchange, attempt } => {
                info!("[{exchange}] reconnecting (attempt {attempt})")
            }
            ConnectionEvent::Error { exchange, message } => warn!("[{exchange}] {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use xarb_core::RawPriceData;
    use xarb_md::normalizer::ExchangeNormalizer;
    use xarb_md::replay::ReplayConnector;

    fn connector(exchange: &str, quotes: Vec<RawPriceData>) -> ReplayConnector {
        ReplayConnector::from_quotes(exchange, quotes).with_restamp(true)
    }

    #[tokio::test]
    async fn replayed_quotes_reach_the_detector() {
        let binance = connector(
            "binance",
            vec![RawPriceData::new("binance", "BTC-USD", dec!(99.00), dec!(100.00), 0)],
        );
        let coinbase = connector(
            "coinbase",
            vec![RawPriceData::new("coinbase", "BTC-USD", dec!(101.50), dec!(102.00), 0)],
        )
        .break_after(1, "maintenance");
        binance.connect().await.unwrap();
        coinbase.connect().await.unwrap();
        let connectors: Vec<Arc<dyn ExchangeConnector>> = vec![Arc::new(binance), Arc::new(coinbase)];

        let detector = Arc::new(SpreadDetector::default());
        let analyses = detector.analysis_stream().unwrap();
        let consumer = tokio::spawn(async move {
            let mut all = Vec::new();
            let mut analyses = analyses;
            while let Some(a) = analyses.next().await {
                all.push(a);
            }
            all
        });

        let ingestion = ExchangeDataIngestion::new(Arc::new(ExchangeNormalizer::default()));
        let symbols = vec!["BTC-USD".to_string(), "ETH-USD".to_string()];
        let mut feeds = spawn_feeds(&connectors, &symbols, &ingestion, &detector);
        let summaries = wait_feeds(&mut feeds).await;
        drop(detector);

        assert_eq!(summaries.len(), 4);
        let quoted: u64 = summaries.iter().map(|s| s.quotes).sum();
        assert_eq!(quoted, 2);
        let broken: Vec<_> = summaries.iter().filter(|s| s.error.is_some()).collect();
        // break_after applies to every coinbase feed, ETH-USD included.
        assert_eq!(broken.len(), 2);
        assert!(broken.iter().all(|s| s.exchange == "coinbase"));

        let all = consumer.await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].buy_exchange, "binance");
        assert_eq!(all[0].sell_exchange, "coinbase");
        assert_eq!(all[0].spread_percentage, dec!(0.015));
    }

    #[tokio::test]
    async fn tally_counts_profitable() {
        let detector = SpreadDetector::default();
        let analyses = detector.analysis_stream().unwrap();
        let quote = |exchange: &str, bid, ask| xarb_core::NormalizedPriceData {
            exchange: exchange.into(),
            symbol: "X".into(),
            bid,
            ask,
            raw_timestamp_us: 0,
            normalized_time: 0.0,
        };
        detector.ingest(quote("a", dec!(99), dec!(100))).await;
        detector.ingest(quote("b", dec!(105), dec!(106))).await;
        detector.ingest(quote("b", dec!(99), dec!(100))).await;
        drop(detector);

        let tally = log_analyses(analyses).await;
        assert_eq!(tally, AnalysisTally { total: 2, profitable: 1 });
    }
}
