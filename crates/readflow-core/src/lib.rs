#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod events;
pub mod ports;
pub mod protocol;
pub mod settings;
pub mod text;

// Re-export commonly used types for convenience
pub use events::SessionEvent;
pub use ports::{
    CatalogError, SynthesisTransport, TransportError, VoiceCatalog, VoiceCatalogPort, VoiceEntry,
};
pub use protocol::{
    AudioChunk, ControlFrame, GenerationId, InboundMessage, OutboundMessage, ProtocolError,
    SynthesisRequest, decode_audio_frame, encode_audio_frame, parse_text_frame,
};
pub use settings::{
    MAX_SPEED, MIN_SPEED, ReaderSettings, SPEED_STEP, SettingsError, clamp_speed,
    validate_settings,
};
pub use text::{
    ContainerId, Pacing, RunPosition, Selection, Sentence, SentenceList, SourceRange, TextRun,
    align_sentences, segment, word_count,
};
