#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod audio;
pub mod audio_thread;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod session;
pub mod transport;
pub mod voices;

// Re-export key types for convenience
pub use audio::{DecodedAudio, decode_wav};
pub use engine::{PlaybackEngine, PlaybackEvent, PlaybackState};
pub use error::VoiceError;
pub use output::{AudioOutput, PlaybackHandle};
pub use pipeline::{PipelineConfig, SynthesisPipeline};
pub use playback::{EndedSender, RodioOutput};
pub use session::{DecodeJob, DecodeOutcome, ReaderSession, SessionCommand};
pub use transport::{WsTransport, WsTransportConfig};
pub use voices::{CatalogClient, VoiceCatalog, VoiceEntry};
