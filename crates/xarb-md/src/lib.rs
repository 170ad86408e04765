//! # xarb-md
//!
//! Market data side of the spread detection system: the connector contract,
//! quote normalization, and the ingestion bridge that turns a connector's raw
//! feed into a normalized stream.
//!
//! ## Architecture
//!
//! ```text
//! ExchangeConnector ──subscribe_to_pairs──► RawQuoteStream
//!                                               │
//!                         ExchangeNormalizer::normalize (per quote)
//!                                               │
//!                   ExchangeDataIngestion ──► NormalizedPriceStream
//! ```
//!
//! - [`normalizer`]: validation, 8-digit rounding, per-instrument sequencing
//! - [`ingestion`]: lazy normalized stream with terminal errors
//! - [`guard`]: circuit-breaker-guarded connect and reconnection loop
//! - [`event`]: connector lifecycle events
//! - [`replay`]: connector replaying recorded quotes
//! - [`registry`]: factory for connectors from config

pub mod event;
pub mod guard;
pub mod ingestion;
pub mod normalizer;
pub mod registry;
pub mod replay;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use xarb_core::{RawPriceData, error::ConnectorError};

use crate::event::ConnectionEventReceiver;

/// Raw quote feed returned by [`ExchangeConnector::subscribe_to_pairs`].
///
/// An `Err` item means the feed broke; the stream is not polled afterwards.
pub type RawQuoteStream = BoxStream<'static, Result<RawPriceData, ConnectorError>>;

/// Contract implemented by exchange connectors (WebSocket/REST clients live
/// outside this workspace; [`replay::ReplayConnector`] is the bundled one).
///
/// All methods take `&self` so a connector can be shared through an `Arc`
/// between its reconnection loop and one ingestion task per symbol.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Exchange name used to tag quotes and errors.
    fn exchange(&self) -> &str;

    /// Establish the connection.
    async fn connect(&self) -> Result<(), ConnectorError>;

    /// Close the connection. Outstanding feeds end.
    async fn disconnect(&self);

    /// Subscribe to `pairs` and return the raw quote feed for them.
    ///
    /// Dropping the returned stream releases the subscription.
    async fn subscribe_to_pairs(&self, pairs: &[String]) -> Result<RawQuoteStream, ConnectorError>;

    /// Lifecycle event channel. Handed out once; `None` afterwards or when
    /// the connector does not report events.
    fn connection_events(&self) -> Option<ConnectionEventReceiver> {
        None
    }
}
