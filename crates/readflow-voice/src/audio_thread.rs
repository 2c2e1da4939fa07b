//! Dedicated audio output thread that keeps `!Send` device resources off the
//! async runtime.
//!
//! `rodio::OutputStream` is `!Send` on some platforms. Rather than using
//! `unsafe impl Send`, the stream is confined to one OS thread and every
//! operation is routed through an [`AudioCommand`].

use std::sync::mpsc;
use std::thread;

use crate::audio::DecodedAudio;
use crate::error::VoiceError;
use crate::output::PlaybackHandle;
use crate::playback::{AudioPlayback, EndedSender};

// ── Commands ───────────────────────────────────────────────────────

enum AudioCommand {
    /// Start a sentence on a fresh sink.
    Start {
        handle: PlaybackHandle,
        audio: DecodedAudio,
        reply: mpsc::Sender<Result<(), VoiceError>>,
    },

    /// Stop one sink (fire-and-forget).
    Stop(PlaybackHandle),

    /// Stop every sink (fire-and-forget).
    StopAll,

    /// Shut down the audio thread, releasing the device.
    Shutdown,
}

// ── Handle (Send + Sync proxy) ─────────────────────────────────────

/// `Send + Sync` handle to the dedicated audio thread.
///
/// `start` blocks until the thread has created the sink (microseconds); stops
/// are fire-and-forget.
pub struct AudioThreadHandle {
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioThreadHandle {
    /// Spawn the audio thread, open the output device and return the handle.
    ///
    /// Device errors are propagated back through a one-shot init channel.
    pub fn spawn(ended_tx: EndedSender) -> Result<Self, VoiceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AudioCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), VoiceError>>();

        let thread = thread::Builder::new()
            .name("readflow-audio".into())
            .spawn(move || Self::run(ended_tx, cmd_rx, init_tx))
            .map_err(|e| VoiceError::OutputStreamError(format!("failed to spawn audio thread: {e}")))?;

        init_rx.recv().map_err(|_| VoiceError::AudioThreadDied)??;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    pub fn start(&self, handle: PlaybackHandle, audio: DecodedAudio) -> Result<(), VoiceError> {
        let (reply, rx) = mpsc::channel();
        self.cmd_tx
            .send(AudioCommand::Start {
                handle,
                audio,
                reply,
            })
            .map_err(|_| VoiceError::AudioThreadDied)?;
        rx.recv().map_err(|_| VoiceError::AudioThreadDied)?
    }

    pub fn stop(&self, handle: PlaybackHandle) {
        let _ = self.cmd_tx.send(AudioCommand::Stop(handle));
    }

    pub fn stop_all(&self) {
        let _ = self.cmd_tx.send(AudioCommand::StopAll);
    }

    // ── Audio thread event loop ────────────────────────────────────

    fn run(
        ended_tx: EndedSender,
        cmd_rx: mpsc::Receiver<AudioCommand>,
        init_tx: mpsc::Sender<Result<(), VoiceError>>,
    ) {
        let mut playback = match AudioPlayback::new(ended_tx) {
            Ok(p) => p,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        if init_tx.send(Ok(())).is_err() {
            return;
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                AudioCommand::Start {
                    handle,
                    audio,
                    reply,
                } => {
                    let _ = reply.send(playback.start(handle, &audio));
                }
                AudioCommand::Stop(handle) => playback.stop(handle),
                AudioCommand::StopAll => playback.stop_all(),
                AudioCommand::Shutdown => break,
            }
        }

        // `playback` is dropped here, on the audio thread.
        tracing::debug!("Audio thread shutting down");
    }
}

impl Drop for AudioThreadHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
