//! Audio playback via `rodio`.
//!
//! [`AudioPlayback`] owns the output device and lives on the dedicated audio
//! thread. [`RodioOutput`] is the [`AudioOutput`] the playback engine holds; it
//! forwards every call to that thread.
//!
//! Each started sentence gets its own sink so a detached sound can keep
//! draining while the next one is prepared. A watcher thread per sink reports
//! the natural end of its handle unless the sink was stopped first.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio::sync::mpsc;

use crate::audio::DecodedAudio;
use crate::audio_thread::AudioThreadHandle;
use crate::error::VoiceError;
use crate::output::{AudioOutput, PlaybackHandle};

/// Channel on which natural ends are reported.
pub type EndedSender = mpsc::UnboundedSender<PlaybackHandle>;

struct ActiveSink {
    sink: Arc<Sink>,
    /// Set by `stop`; suppresses the end report.
    stopped: Arc<AtomicBool>,
}

/// Output device state. Not `Send` on every platform, so it never leaves the
/// audio thread.
pub struct AudioPlayback {
    /// rodio output stream (must be kept alive).
    _stream: OutputStream,

    /// Handle used to create sinks.
    stream_handle: OutputStreamHandle,

    sinks: HashMap<PlaybackHandle, ActiveSink>,

    ended_tx: EndedSender,
}

impl AudioPlayback {
    /// Open the default output device.
    pub fn new(ended_tx: EndedSender) -> Result<Self, VoiceError> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;

        tracing::info!("Audio playback initialized on default output device");

        Ok(Self {
            _stream: stream,
            stream_handle,
            sinks: HashMap::new(),
            ended_tx,
        })
    }

    /// Start `audio` on a fresh sink and watch it for its natural end.
    pub fn start(&mut self, handle: PlaybackHandle, audio: &DecodedAudio) -> Result<(), VoiceError> {
        self.sinks.retain(|_, active| !active.sink.empty());

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        sink.append(SamplesBuffer::new(
            audio.channels,
            audio.sample_rate,
            audio.samples.to_vec(),
        ));

        let sink = Arc::new(sink);
        let stopped = Arc::new(AtomicBool::new(false));
        self.spawn_completion_watcher(handle, Arc::clone(&sink), Arc::clone(&stopped));
        self.sinks.insert(handle, ActiveSink { sink, stopped });

        tracing::debug!(%handle, duration_ms = audio.duration.as_millis(), "Playback started");
        Ok(())
    }

    /// Stop the sink started under `handle`, if it is still around.
    pub fn stop(&mut self, handle: PlaybackHandle) {
        if let Some(active) = self.sinks.remove(&handle) {
            active.stopped.store(true, Ordering::SeqCst);
            active.sink.stop();
            tracing::debug!(%handle, "Playback stopped");
        }
    }

    /// Stop everything.
    pub fn stop_all(&mut self) {
        let handles: Vec<PlaybackHandle> = self.sinks.keys().copied().collect();
        for handle in handles {
            self.stop(handle);
        }
    }

    fn spawn_completion_watcher(
        &self,
        handle: PlaybackHandle,
        sink: Arc<Sink>,
        stopped: Arc<AtomicBool>,
    ) {
        let ended_tx = self.ended_tx.clone();

        // `sleep_until_end()` returns when the queue drains or `stop()` drops
        // the sources.
        std::thread::spawn(move || {
            sink.sleep_until_end();
            if stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            tracing::trace!(%handle, "Playback finished naturally");
            let _ = ended_tx.send(handle);
        });
    }
}

/// [`AudioOutput`] backed by the default output device.
pub struct RodioOutput {
    audio: AudioThreadHandle,
}

impl RodioOutput {
    /// Spawn the audio thread and open the default device. Natural ends are
    /// reported on `ended_tx`.
    pub fn open(ended_tx: EndedSender) -> Result<Self, VoiceError> {
        Ok(Self {
            audio: AudioThreadHandle::spawn(ended_tx)?,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn start(&mut self, handle: PlaybackHandle, audio: &DecodedAudio) -> Result<(), VoiceError> {
        self.audio.start(handle, audio.clone())
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.audio.stop(handle);
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.audio.stop_all();
    }
}
