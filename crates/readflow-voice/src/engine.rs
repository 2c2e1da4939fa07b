//! Playback engine: gapless, strictly sequential sentence playback.
//!
//! ```text
//!            play_sentence(i), not buffered
//!   Idle ─────────────────────────────────► AwaitingAudio
//!    │                                          │ audio for i arrives
//!    │ play_sentence(i), buffered               ▼ (while playing)
//!    └────────────────────────────────────► Playing ──pause──► Paused
//!                                              │ natural end
//!                                              ▼
//!                               i+1 (Playing/AwaitingAudio) or Finished
//! ```
//!
//! The engine owns the audio buffer map (sentence index → decoded audio) and
//! publishes [`PlaybackEvent`]s on a channel. Audio may arrive in any order;
//! playback never skips ahead of a missing sentence.

use std::collections::BTreeMap;
use std::time::Duration;

use readflow_core::clamp_speed;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::audio::{DecodedAudio, decode_wav};
use crate::output::{AudioOutput, PlaybackHandle};

// ── Playback state machine ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing selected.
    Idle,

    /// The current sentence has no audio yet.
    AwaitingAudio,

    /// The current sentence is sounding.
    Playing,

    /// Stopped by the user; resumes from the start of the current sentence.
    Paused,

    /// The last sentence ended naturally.
    Finished,
}

// ── Events emitted by the engine ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Sentence `index` became current (sounding or awaiting audio).
    SentenceStarted { index: usize },

    /// Position update, emitted with every sentence change.
    Progress { index: usize, total: usize },

    /// The last sentence ended naturally.
    Finished,

    /// The output refused to start sentence `index`; playback is paused.
    OutputFailed { index: usize, message: String },
}

// ── Playback engine ────────────────────────────────────────────────

pub struct PlaybackEngine {
    output: Box<dyn AudioOutput>,

    buffers: BTreeMap<usize, DecodedAudio>,

    total: usize,

    /// Playback cursor; `None` until something is selected.
    current: Option<usize>,

    /// Whether the user wants audio to be playing.
    playing: bool,

    state: PlaybackState,

    /// Handle of the sound for `current`, if one is sounding.
    active: Option<PlaybackHandle>,

    /// A sound left to finish on its own after its sentence lost its audio.
    detached: Option<PlaybackHandle>,

    next_handle: u64,

    speed: f32,

    event_tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackEngine {
    /// Create an idle engine.
    ///
    /// Returns the engine and a receiver for [`PlaybackEvent`]s.
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = Self {
            output,
            buffers: BTreeMap::new(),
            total: 0,
            current: None,
            playing: false,
            state: PlaybackState::Idle,
            active: None,
            detached: None,
            next_handle: 0,
            speed: 1.0,
            event_tx,
        };
        (engine, event_rx)
    }

    #[must_use]
    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub const fn total_sentences(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    #[must_use]
    pub fn has_buffer(&self, index: usize) -> bool {
        self.buffers.contains_key(&index)
    }

    #[must_use]
    pub fn buffered_indices(&self) -> Vec<usize> {
        self.buffers.keys().copied().collect()
    }

    pub const fn set_total_sentences(&mut self, total: usize) {
        self.total = total;
    }

    /// Store the clamped speed and return it.
    ///
    /// Audio is synthesized at the requested speed, so this only affects
    /// estimates; already buffered audio keeps its pace.
    pub fn set_speed(&mut self, speed: f32) -> f32 {
        self.speed = clamp_speed(speed);
        self.speed
    }

    // ── Sequencing ─────────────────────────────────────────────────

    /// Make `index` the current sentence and start it if its audio is here.
    ///
    /// Out-of-range indices are ignored. Without audio the engine waits in
    /// [`PlaybackState::AwaitingAudio`]; whatever was sounding is left to
    /// finish on its own.
    pub fn play_sentence(&mut self, index: usize) {
        if index >= self.total {
            return;
        }

        if !self.buffers.contains_key(&index) {
            self.detach_active();
            self.current = Some(index);
            self.set_state(PlaybackState::AwaitingAudio);
            self.announce(index);
            return;
        }

        self.stop_sounds();
        self.current = Some(index);

        let handle = self.allocate_handle();
        let Some(audio) = self.buffers.get(&index) else {
            return;
        };
        match self.output.start(handle, audio) {
            Ok(()) => {
                self.active = Some(handle);
                self.playing = true;
                self.set_state(PlaybackState::Playing);
                self.announce(index);
            }
            Err(e) => {
                tracing::error!(index, error = %e, "Failed to start sentence playback");
                self.playing = false;
                self.set_state(PlaybackState::Paused);
                self.announce(index);
                self.emit(PlaybackEvent::OutputFailed {
                    index,
                    message: e.to_string(),
                });
            }
        }
    }

    /// The output reports that the sound under `handle` drained.
    ///
    /// Only the current sound advances playback, and only while playing.
    pub fn on_playback_ended(&mut self, handle: PlaybackHandle) {
        if self.detached == Some(handle) {
            self.detached = None;
            return;
        }
        if self.active != Some(handle) || !self.playing {
            tracing::trace!(%handle, "Ignoring end of superseded sound");
            return;
        }
        self.active = None;

        let Some(index) = self.current else {
            return;
        };
        let next = index + 1;
        if next < self.total {
            self.play_sentence(next);
        } else {
            self.playing = false;
            self.set_state(PlaybackState::Finished);
            tracing::info!(total = self.total, "Reached the end of the text");
            self.emit(PlaybackEvent::Finished);
        }
    }

    /// Decode a WAV chunk for `index` and store it.
    ///
    /// Decode failures are logged and otherwise ignored.
    pub fn add_chunk(&mut self, index: usize, bytes: &[u8]) {
        match decode_wav(bytes) {
            Ok(audio) => self.add_decoded(index, audio),
            Err(e) => tracing::warn!(index, error = %e, "Failed to decode audio chunk"),
        }
    }

    /// Store decoded audio for `index`, starting it when playback is waiting
    /// for exactly this sentence.
    pub fn add_decoded(&mut self, index: usize, audio: DecodedAudio) {
        if index >= self.total {
            tracing::debug!(index, total = self.total, "Dropping audio past the end");
            return;
        }
        self.buffers.insert(index, audio);

        if self.current.is_none() && index == 0 {
            self.play_sentence(0);
        } else if self.playing && self.active.is_none() && self.current == Some(index) {
            self.play_sentence(index);
        }
    }

    /// Drop buffered audio for `index` and everything after it.
    pub fn clear_buffers_from(&mut self, index: usize) {
        let dropped = self.buffers.split_off(&index);
        if !dropped.is_empty() {
            tracing::debug!(from = index, count = dropped.len(), "Cleared buffered audio");
        }
    }

    // ── Transport controls ─────────────────────────────────────────

    /// Resume (or start) playback at the current sentence. After the end of
    /// the text that is the last sentence again.
    pub fn play(&mut self) {
        if self.playing || self.total == 0 {
            return;
        }
        self.restart_at(self.current.unwrap_or(0));
    }

    /// Make `index` current and keep wanting to play it, even if its audio
    /// has not arrived yet.
    pub fn restart_at(&mut self, index: usize) {
        if index >= self.total {
            return;
        }
        self.playing = true;
        self.play_sentence(index);
    }

    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.playing = false;
        self.stop_sounds();
        self.set_state(PlaybackState::Paused);
    }

    /// Toggle and return the new playing flag.
    pub fn toggle_play_pause(&mut self) -> bool {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
        self.playing
    }

    /// Move the cursor by `delta` sentences, clamped to the text.
    ///
    /// Returns the new index, or `None` when the cursor did not move.
    pub fn skip_sentences(&mut self, delta: isize) -> Option<usize> {
        let target = self.skip_target(delta)?;
        if Some(target) == self.current {
            return None;
        }
        self.play_sentence(target);
        Some(target)
    }

    /// Where [`skip_sentences`](Self::skip_sentences) would land.
    #[must_use]
    pub fn skip_target(&self, delta: isize) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        #[allow(clippy::cast_possible_wrap)]
        let base = self.current.map_or(-1, |index| index as isize);
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        let target = base.saturating_add(delta).clamp(0, self.total as isize - 1) as usize;
        Some(target)
    }

    /// Silence everything and clear the cursor. Buffers are kept.
    pub fn stop(&mut self) {
        self.playing = false;
        self.stop_sounds();
        self.current = None;
        self.set_state(PlaybackState::Idle);
    }

    /// [`stop`](Self::stop), then forget all audio and the sentence count.
    pub fn reset(&mut self) {
        self.stop();
        self.buffers.clear();
        self.total = 0;
    }

    // ── Duration queries ───────────────────────────────────────────

    /// Decoded duration of sentence `index`, if its audio has arrived.
    #[must_use]
    pub fn buffered_duration(&self, index: usize) -> Option<Duration> {
        self.buffers.get(&index).map(|audio| audio.duration)
    }

    /// Decoded duration of the current sentence, zero if it has no audio.
    #[must_use]
    pub fn current_duration(&self) -> Duration {
        self.current
            .and_then(|index| self.buffers.get(&index))
            .map_or(Duration::ZERO, |audio| audio.duration)
    }

    /// Decoded duration of the arrived sentences before the current one.
    #[must_use]
    pub fn elapsed_duration(&self) -> Duration {
        let Some(current) = self.current else {
            return Duration::ZERO;
        };
        self.buffers.range(..current).map(|(_, a)| a.duration).sum()
    }

    /// Decoded duration of every arrived sentence.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.buffers.range(..self.total).map(|(_, a)| a.duration).sum()
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn allocate_handle(&mut self) -> PlaybackHandle {
        self.next_handle += 1;
        PlaybackHandle(self.next_handle)
    }

    fn detach_active(&mut self) {
        if let Some(handle) = self.active.take() {
            if let Some(previous) = self.detached.replace(handle) {
                self.output.stop(previous);
            }
        }
    }

    fn stop_sounds(&mut self) {
        if let Some(handle) = self.active.take() {
            self.output.stop(handle);
        }
        if let Some(handle) = self.detached.take() {
            self.output.stop(handle);
        }
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        if self.state != new_state {
            tracing::debug!(old = ?self.state, new = ?new_state, "Playback state transition");
            self.state = new_state;
        }
    }

    fn announce(&self, index: usize) {
        self.emit(PlaybackEvent::SentenceStarted { index });
        self.emit(PlaybackEvent::Progress {
            index,
            total: self.total,
        });
    }

    /// Emit an event; a dropped receiver is logged and otherwise ignored.
    fn emit(&self, event: PlaybackEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::warn!("Playback event receiver dropped");
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop_sounds();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audio::fixtures::wav_bytes;
    use crate::error::VoiceError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Start(PlaybackHandle),
        Stop(PlaybackHandle),
    }

    #[derive(Clone, Default)]
    struct RecordingOutput {
        calls: Arc<Mutex<Vec<Call>>>,
        fail: bool,
    }

    impl AudioOutput for RecordingOutput {
        fn start(&mut self, handle: PlaybackHandle, _audio: &DecodedAudio) -> Result<(), VoiceError> {
            if self.fail {
                return Err(VoiceError::OutputStreamError("no device".into()));
            }
            self.calls.lock().unwrap().push(Call::Start(handle));
            Ok(())
        }

        fn stop(&mut self, handle: PlaybackHandle) {
            self.calls.lock().unwrap().push(Call::Stop(handle));
        }
    }

    fn engine(total: usize) -> (PlaybackEngine, mpsc::UnboundedReceiver<PlaybackEvent>, RecordingOutput) {
        let output = RecordingOutput::default();
        let (mut engine, rx) = PlaybackEngine::new(Box::new(output.clone()));
        engine.set_total_sentences(total);
        (engine, rx, output)
    }

    fn second() -> DecodedAudio {
        DecodedAudio::silence(Duration::from_secs(1), 100)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn last_started(output: &RecordingOutput) -> PlaybackHandle {
        output
            .calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::Start(h) => Some(*h),
                Call::Stop(_) => None,
            })
            .unwrap()
    }

    #[test]
    fn first_chunk_auto_starts_when_idle() {
        let (mut engine, mut rx, _output) = engine(3);
        engine.add_decoded(0, second());

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.current_index(), Some(0));
        assert!(engine.is_playing());
        assert_eq!(
            drain(&mut rx),
            vec![
                PlaybackEvent::SentenceStarted { index: 0 },
                PlaybackEvent::Progress { index: 0, total: 3 }
            ]
        );
    }

    #[test]
    fn non_first_chunk_does_not_auto_start_when_idle() {
        let (mut engine, _rx, _output) = engine(3);
        engine.add_decoded(1, second());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.has_buffer(1));
    }

    #[test]
    fn unbuffered_sentence_waits_then_starts_on_arrival() {
        let (mut engine, _rx, _output) = engine(3);
        engine.restart_at(1);
        assert_eq!(engine.state(), PlaybackState::AwaitingAudio);

        engine.add_decoded(2, second());
        assert_eq!(engine.state(), PlaybackState::AwaitingAudio);

        engine.add_decoded(1, second());
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.current_index(), Some(1));
    }

    #[test]
    fn natural_end_advances_and_finishes() {
        let (mut engine, mut rx, output) = engine(2);
        engine.add_decoded(1, second());
        engine.add_decoded(0, second());
        engine.on_playback_ended(last_started(&output));
        assert_eq!(engine.current_index(), Some(1));

        engine.on_playback_ended(last_started(&output));
        assert_eq!(engine.state(), PlaybackState::Finished);
        assert!(!engine.is_playing());
        assert_eq!(drain(&mut rx).last(), Some(&PlaybackEvent::Finished));
    }

    #[test]
    fn stale_end_reports_are_ignored() {
        let (mut engine, _rx, output) = engine(3);
        engine.add_decoded(0, second());
        engine.add_decoded(1, second());
        let first = last_started(&output);

        engine.skip_sentences(1);
        engine.on_playback_ended(first);
        assert_eq!(engine.current_index(), Some(1));
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn end_while_paused_does_not_advance() {
        let (mut engine, _rx, output) = engine(3);
        engine.add_decoded(0, second());
        let handle = last_started(&output);
        engine.pause();
        engine.on_playback_ended(handle);

        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.current_index(), Some(0));
        assert!(output.calls.lock().unwrap().contains(&Call::Stop(handle)));
    }

    #[test]
    fn play_after_pause_while_awaiting_starts_on_arrival() {
        let (mut engine, _rx, _output) = engine(3);
        engine.restart_at(0);
        assert!(!engine.toggle_play_pause());
        assert!(engine.toggle_play_pause());
        assert_eq!(engine.state(), PlaybackState::AwaitingAudio);

        engine.add_decoded(0, second());
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn waiting_detaches_without_stopping_then_stops_on_next_start() {
        let (mut engine, _rx, output) = engine(3);
        engine.add_decoded(0, second());
        let sounding = last_started(&output);

        engine.clear_buffers_from(0);
        engine.restart_at(0);
        assert_eq!(engine.state(), PlaybackState::AwaitingAudio);
        assert!(!output.calls.lock().unwrap().contains(&Call::Stop(sounding)));

        // The detached sound ending must not advance playback.
        engine.on_playback_ended(sounding);
        assert_eq!(engine.current_index(), Some(0));
        assert_eq!(engine.state(), PlaybackState::AwaitingAudio);

        engine.add_decoded(0, second());
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn skip_clamps_and_ignores_same_index() {
        let (mut engine, _rx, _output) = engine(4);
        engine.restart_at(1);
        assert_eq!(engine.skip_sentences(10), Some(3));
        assert_eq!(engine.skip_sentences(1), None);
        assert_eq!(engine.skip_sentences(-10), Some(0));
        assert_eq!(engine.skip_target(-1), Some(0));
    }

    #[test]
    fn skip_from_nothing_counts_from_before_the_start() {
        let (mut engine, _rx, _output) = engine(4);
        assert_eq!(engine.skip_target(1), Some(0));
        assert_eq!(engine.skip_target(5), Some(3));
    }

    #[test]
    fn out_of_range_is_a_no_op() {
        let (mut engine, mut rx, _output) = engine(2);
        engine.play_sentence(2);
        engine.add_decoded(5, second());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(drain(&mut rx).is_empty());
        assert!(engine.buffered_indices().is_empty());
    }

    #[test]
    fn output_failure_pauses_and_reports() {
        let output = RecordingOutput {
            fail: true,
            ..Default::default()
        };
        let (mut engine, mut rx) = PlaybackEngine::new(Box::new(output));
        engine.set_total_sentences(1);
        engine.add_decoded(0, second());

        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, PlaybackEvent::OutputFailed { index: 0, .. })));
    }

    #[test]
    fn durations_count_only_arrived_audio() {
        let (mut engine, _rx, _output) = engine(4);
        engine.add_decoded(1, second());
        engine.add_decoded(3, DecodedAudio::silence(Duration::from_millis(500), 100));
        engine.restart_at(2);

        assert_eq!(engine.current_duration(), Duration::ZERO);
        assert_eq!(engine.elapsed_duration(), Duration::from_secs(1));
        assert_eq!(engine.total_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn reset_clears_everything() {
        let (mut engine, _rx, _output) = engine(3);
        engine.add_decoded(0, second());
        engine.reset();

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(engine.current_index(), None);
        assert!(engine.buffered_indices().is_empty());
        assert_eq!(engine.total_sentences(), 0);
    }

    #[test]
    fn undecodable_chunk_is_ignored() {
        let (mut engine, _rx, _output) = engine(2);
        engine.add_chunk(0, b"not audio");
        assert!(!engine.has_buffer(0));

        engine.add_chunk(0, &wav_bytes(100, 100, 0));
        assert!(engine.has_buffer(0));
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[test]
    fn speed_is_clamped() {
        let (mut engine, _rx, _output) = engine(1);
        assert!((engine.set_speed(5.0) - 2.0).abs() < f32::EPSILON);
        assert!((engine.set_speed(0.1) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn play_after_finish_replays_last_sentence() {
        let (mut engine, _rx, output) = engine(2);
        engine.add_decoded(0, second());
        engine.add_decoded(1, second());
        engine.on_playback_ended(last_started(&output));
        engine.on_playback_ended(last_started(&output));
        assert_eq!(engine.state(), PlaybackState::Finished);

        engine.play();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.current_index(), Some(1));
    }
}
