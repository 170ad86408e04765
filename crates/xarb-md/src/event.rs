//! Connection lifecycle events emitted by connectors.
//!
//! The core pipeline does not consume these; the runner logs them and
//! downstream tooling may surface them.

/// A lifecycle event from an [`ExchangeConnector`](crate::ExchangeConnector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection was established.
    Connected { exchange: String },

    /// The connection was closed.
    Disconnected {
        exchange: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A reconnection attempt is about to be made.
    Reconnecting { exchange: String, attempt: u32 },

    /// A non-fatal error occurred.
    Error { exchange: String, message: String },
}

impl ConnectionEvent {
    pub fn exchange(&self) -> &str {
        match self {
            Self::Connected { exchange }
            | Self::Disconnected { exchange, .. }
            | Self::Reconnecting { exchange, .. }
            | Self::Error { exchange, .. } => exchange,
        }
    }
}

/// Sender half of the connection event channel.
pub type ConnectionEventSender = tokio::sync::mpsc::UnboundedSender<ConnectionEvent>;

/// Receiver half of the connection event channel.
pub type ConnectionEventReceiver = tokio::sync::mpsc::UnboundedReceiver<ConnectionEvent>;
