//! Audio output port used by the playback engine.
//!
//! The engine never touches an audio device directly. It asks an
//! [`AudioOutput`] to start one sentence at a time, tagging each start with a
//! fresh [`PlaybackHandle`]. When a sound drains on its own the output reports
//! that handle back (through whatever channel the adapter was built with); the
//! engine ignores reports for handles it no longer cares about, so a late
//! "ended" from a sound that was stopped or superseded is harmless.

use std::fmt;

use crate::audio::DecodedAudio;
use crate::error::VoiceError;

/// Identity of one started sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackHandle(pub u64);

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A device (or fake) that plays one sentence at a time.
pub trait AudioOutput: Send {
    /// Start playing `audio` immediately. Whatever was sounding before keeps
    /// its own lifetime unless [`stop`](Self::stop) was called.
    fn start(&mut self, handle: PlaybackHandle, audio: &DecodedAudio) -> Result<(), VoiceError>;

    /// Silence the sound started under `handle`. Idempotent; a stopped sound
    /// never reports a natural end.
    fn stop(&mut self, handle: PlaybackHandle);
}
