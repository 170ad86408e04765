//! Replay connector: serves recorded quotes as if they came from an exchange.
//!
//! Quotes come from memory or from a JSON-lines file with one quote per line:
//!
//! ```text
//! {"symbol":"BTC-USD","bid":"99.00","ask":"100.00","timestamp_us":1700000000000000}
//! ```
//!
//! The exchange name is taken from the connector, not the file. With
//! `restamp` enabled (the default for file replays) each quote's timestamp is
//! replaced by the current wall-clock time as it is emitted, so recordings
//! pass the normalizer's staleness check.
//!
//! Failure injection (`fail_connects`, `reject_subscriptions`, `break_after`)
//! lets tests and dry runs exercise the breaker and ingestion error paths.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};
use xarb_core::RawPriceData;
use xarb_core::error::ConnectorError;
use xarb_core::time_util::now_us;

use crate::event::{ConnectionEvent, ConnectionEventReceiver, ConnectionEventSender};
use crate::{ExchangeConnector, RawQuoteStream};

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    symbol: String,
    bid: Decimal,
    ask: Decimal,
    #[serde(default)]
    timestamp_us: Option<u64>,
}

/// Connector replaying a fixed list of quotes.
pub struct ReplayConnector {
    exchange: String,
    quotes: Vec<RawPriceData>,
    interval: Duration,
    restamp: bool,
    connected: AtomicBool,
    failing_connects: AtomicU32,
    connect_attempts: AtomicU32,
    reject_subscriptions: Option<String>,
    break_after: Option<(usize, String)>,
    events_tx: ConnectionEventSender,
    events_rx: Mutex<Option<ConnectionEventReceiver>>,
}

impl ReplayConnector {
    /// Replay `quotes` as-is (no pacing, no restamping).
    pub fn from_quotes(exchange: impl Into<String>, quotes: Vec<RawPriceData>) -> Self {
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            exchange: exchange.into(),
            quotes,
            interval: Duration::ZERO,
            restamp: false,
            connected: AtomicBool::new(false),
            failing_connects: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
            reject_subscriptions: None,
            break_after: None,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Parse a JSON-lines replay file. Blank lines are skipped; a malformed
    /// line is an error naming its line number.
    pub fn from_jsonl(exchange: impl Into<String>, path: &Path) -> Result<Self> {
        let exchange = exchange.into();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading replay file {}", path.display()))?;
        let quotes = parse_jsonl(&exchange, &content)
            .with_context(|| format!("parsing replay file {}", path.display()))?;
        info!("[{exchange}] loaded {} replay quote(s) from {}", quotes.len(), path.display());
        Ok(Self::from_quotes(exchange, quotes).with_restamp(true))
    }

    /// Sleep `interval` before each emitted quote.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace quote timestamps with the emission time.
    pub fn with_restamp(mut self, restamp: bool) -> Self {
        self.restamp = restamp;
        self
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_connects(self, n: u32) -> Self {
        self.failing_connects.store(n, Ordering::SeqCst);
        self
    }

    /// Reject every subscription with `reason`.
    pub fn reject_subscriptions(mut self, reason: impl Into<String>) -> Self {
        self.reject_subscriptions = Some(reason.into());
        self
    }

    /// End each feed with a `Closed(reason)` error after `n` quotes.
    pub fn break_after(mut self, n: usize, reason: impl Into<String>) -> Self {
        self.break_after = Some((n, reason.into()));
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receiver is fine: nobody asked for events.
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl ExchangeConnector for ReplayConnector {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        let attempt = self.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > 1 {
            self.emit(ConnectionEvent::Reconnecting {
                exchange: self.exchange.clone(),
                attempt,
            });
        }
        let claimed = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(remaining) = claimed {
            let reason = format!("injected failure ({} left)", remaining - 1);
            self.emit(ConnectionEvent::Error {
                exchange: self.exchange.clone(),
                message: reason.clone(),
            });
            return Err(ConnectorError::Connect(reason));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.emit(ConnectionEvent::Connected {
            exchange: self.exchange.clone(),
        });
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(ConnectionEvent::Disconnected {
                exchange: self.exchange.clone(),
                reason: "client requested".into(),
            });
        }
    }

    async fn subscribe_to_pairs(&self, pairs: &[String]) -> Result<RawQuoteStream, ConnectorError> {
        if !self.is_connected() {
            return Err(ConnectorError::Closed("not connected".into()));
        }
        if let Some(reason) = &self.reject_subscriptions {
            return Err(ConnectorError::Rejected(reason.clone()));
        }

        let mut items: Vec<Result<RawPriceData, ConnectorError>> = self
            .quotes
            .iter()
            .filter(|q| pairs.contains(&q.symbol))
            .cloned()
            .map(Ok)
            .collect();
        if let Some((n, reason)) = &self.break_after {
            items.truncate(*n);
            items.push(Err(ConnectorError::Closed(reason.clone())));
        }
        debug!("[{}] replaying {} item(s) for {pairs:?}", self.exchange, items.len());

        let interval = self.interval;
        let restamp = self.restamp;
        let feed = stream::iter(items).then(move |item| async move {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            item.map(|mut quote| {
                if restamp {
                    quote.timestamp_us = now_us();
                }
                quote
            })
        });
        Ok(feed.boxed())
    }

    fn connection_events(&self) -> Option<ConnectionEventReceiver> {
        self.events_rx.lock().ok()?.take()
    }
}

fn parse_jsonl(exchange: &str, content: &str) -> Result<Vec<RawPriceData>> {
    let mut quotes = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: ReplayLine =
            serde_json::from_str(line).with_context(|| format!("line {}", idx + 1))?;
        quotes.push(RawPriceData {
            exchange: exchange.to_string(),
            symbol: parsed.symbol,
            bid: parsed.bid,
            ask: parsed.ask,
            timestamp_us: parsed.timestamp_us.unwrap_or(0),
        });
    }
    Ok(quotes)
}
