//! Read-aloud error types.

use readflow_core::{CatalogError, TransportError};

/// Errors that can occur while reading text aloud.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The text produced no sentences.
    #[error("Nothing to read: the text contains no sentences")]
    EmptyText,

    /// A synthesized chunk could not be decoded.
    #[error("Failed to decode audio for sentence {index}: {message}")]
    Decode { index: usize, message: String },

    /// Failed to open the audio output stream.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// The dedicated audio thread exited or panicked.
    #[error("Audio thread is no longer running")]
    AudioThreadDied,

    /// Sending to the synthesis server failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Voice catalog or health request failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
