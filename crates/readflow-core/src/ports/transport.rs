//! Outbound half of the synthesis service connection.
//!
//! Inbound traffic (chunks, completions, errors) is delivered to the session as
//! [`InboundMessage`](crate::protocol::InboundMessage) values over a channel
//! owned by the adapter, so the port only covers sending.

use thiserror::Error;

use crate::protocol::OutboundMessage;

/// Errors raised synchronously by a transport.
///
/// Connection failures discovered later surface as inbound errors instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The service could not be reached.
    #[error("Cannot connect to TTS server: {0}")]
    Unreachable(String),

    /// The transport has shut down and accepts no more messages.
    #[error("Transport closed")]
    Closed,
}

/// Sends protocol messages to the synthesis service.
///
/// `send` must not block: adapters queue the message and return.
pub trait SynthesisTransport: Send + Sync {
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;
}
