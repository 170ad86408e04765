//! Ingestion bridge: connector feed → normalized quote stream.
//!
//! [`ExchangeDataIngestion::normalized_price_stream`] returns a lazy,
//! single-pass stream. Nothing happens until it is first polled; then the
//! connector is asked to subscribe to the one symbol and each raw quote is
//! passed through [`ExchangeNormalizer::normalize`]. Rejected quotes are
//! dropped silently.
//!
//! Termination:
//! - subscription fails → one `IngestionError::SubscriptionFailed`, then end
//! - feed yields an error → one `IngestionError::ConnectionLost`, then end
//! - feed ends → stream ends
//!
//! The bridge spawns no task: dropping the stream drops the connector's feed
//! on the spot, which releases the subscription.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info, warn};
use xarb_core::NormalizedPriceData;
use xarb_core::error::IngestionError;

use crate::normalizer::ExchangeNormalizer;
use crate::{ExchangeConnector, RawQuoteStream};

/// Normalized quotes for one (connector, symbol), ending with at most one error.
pub type NormalizedPriceStream = BoxStream<'static, Result<NormalizedPriceData, IngestionError>>;

enum BridgeState {
    Subscribing {
        connector: Arc<dyn ExchangeConnector>,
        symbol: String,
    },
    Streaming {
        exchange: String,
        symbol: String,
        feed: RawQuoteStream,
    },
    Finished,
}

/// Bridges connectors to the normalizer.
#[derive(Clone)]
pub struct ExchangeDataIngestion {
    normalizer: Arc<ExchangeNormalizer>,
}

impl ExchangeDataIngestion {
    pub fn new(normalizer: Arc<ExchangeNormalizer>) -> Self {
        Self { normalizer }
    }

    /// Normalized quote stream for `symbol` on `connector`.
    pub fn normalized_price_stream(
        &self,
        connector: Arc<dyn ExchangeConnector>,
        symbol: impl Into<String>,
    ) -> NormalizedPriceStream {
        let normalizer = self.normalizer.clone();
        let initial = BridgeState::Subscribing {
            connector,
            symbol: symbol.into(),
        };

        stream::unfold(initial, move |state| {
            let normalizer = normalizer.clone();
            async move { next_item(state, &normalizer).await }
        })
        .boxed()
    }
}

async fn next_item(
    mut state: BridgeState,
    normalizer: &ExchangeNormalizer,
) -> Option<(Result<NormalizedPriceData, IngestionError>, BridgeState)> {
    loop {
        state = match state {
            BridgeState::Subscribing { connector, symbol } => {
                let exchange = connector.exchange().to_string();
                match connector.subscribe_to_pairs(std::slice::from_ref(&symbol)).await {
                    Ok(feed) => {
                        info!("[{exchange}] subscribed to {symbol}");
                        BridgeState::Streaming {
                            exchange,
                            symbol,
                            feed,
                        }
                    }
                    Err(e) => {
                        warn!("[{exchange}] subscription to {symbol} failed: {e}");
                        let err = IngestionError::SubscriptionFailed {
                            reason: e.reason().to_string(),
                            exchange,
                            symbol,
                            source: Some(e),
                        };
                        return Some((Err(err), BridgeState::Finished));
                    }
                }
            }
            BridgeState::Streaming {
                exchange,
                symbol,
                mut feed,
            } => match feed.next().await {
                Some(Ok(raw)) => {
                    if raw.symbol == symbol {
                        if let Some(quote) = normalizer.normalize(&raw).await {
                            let next = BridgeState::Streaming {
                                exchange,
                                symbol,
                                feed,
                            };
                            return Some((Ok(quote), next));
                        }
                    } else {
                        debug!("[{exchange}] ignoring {} on {symbol} feed", raw.symbol);
                    }
                    BridgeState::Streaming {
                        exchange,
                        symbol,
                        feed,
                    }
                }
                Some(Err(e)) => {
                    warn!("[{exchange}] {symbol} feed broke: {e}");
                    let err = IngestionError::ConnectionLost {
                        exchange,
                        reason: e.reason().to_string(),
                    };
                    return Some((Err(err), BridgeState::Finished));
                }
                None => {
                    info!("[{exchange}] {symbol} feed ended");
                    return None;
                }
            },
            BridgeState::Finished => return None,
        };
    }
}
