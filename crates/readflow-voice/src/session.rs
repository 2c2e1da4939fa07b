//! Reader session: one read-aloud of one selection.
//!
//! The session is the single owner of all reading state: the sentence list,
//! highlight spans, the synthesis pipeline and the playback engine. Every
//! input (transport message, decoded chunk, end of a sound, user command) is
//! handled to completion by one `handle_*` method; the only work that leaves
//! the session is WAV decoding, packaged as a [`DecodeJob`] that carries the
//! generation it was started under and is re-checked when it comes back.
//!
//! [`ReaderSession::run`] drives those handlers from channels. Tests call them
//! directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use readflow_core::{
    GenerationId, InboundMessage, Pacing, ReaderSettings, SPEED_STEP, Selection, SentenceList,
    SessionEvent, SourceRange, SynthesisTransport, TransportError, clamp_speed,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::audio::{DecodedAudio, decode_wav};
use crate::engine::{PlaybackEngine, PlaybackEvent, PlaybackState};
use crate::error::VoiceError;
use crate::output::{AudioOutput, PlaybackHandle};
use crate::pipeline::{PipelineConfig, SynthesisPipeline};

// ── Commands ───────────────────────────────────────────────────────

/// User controls, mirroring the reading overlay's buttons and shortcuts.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    TogglePlayPause,
    Play,
    Pause,
    /// Move by this many sentences (negative goes back).
    Skip(isize),
    SpeedUp,
    SpeedDown,
    SetSpeed(f32),
    SetVoice(String),
    Stop,
}

// ── Decoding ───────────────────────────────────────────────────────

/// Decoding work for one received chunk.
#[derive(Debug)]
pub struct DecodeJob {
    pub generation: GenerationId,
    pub index: usize,
    bytes: Vec<u8>,
}

impl DecodeJob {
    /// Decode the chunk. Blocking; run it off the session's thread.
    #[must_use]
    pub fn run(self) -> DecodeOutcome {
        let result = decode_wav(&self.bytes).map_err(|e| VoiceError::Decode {
            index: self.index,
            message: e.to_string(),
        });
        DecodeOutcome {
            generation: self.generation,
            index: self.index,
            result,
        }
    }
}

#[derive(Debug)]
pub struct DecodeOutcome {
    pub generation: GenerationId,
    pub index: usize,
    pub result: Result<DecodedAudio, VoiceError>,
}

// ── Session ────────────────────────────────────────────────────────

pub struct ReaderSession {
    sentences: SentenceList,

    /// Highlight range per sentence.
    spans: Vec<Option<SourceRange>>,

    engine: PlaybackEngine,

    engine_events: mpsc::UnboundedReceiver<PlaybackEvent>,

    pipeline: SynthesisPipeline,

    pacing: Pacing,

    speed: f32,

    stall_timeout: Option<Duration>,

    /// Sentence the engine is waiting on and since when.
    awaiting_since: Option<(usize, Instant)>,

    stall_reported: bool,

    /// Last play/pause flag published.
    reported_playing: Option<bool>,

    started: bool,

    finished: bool,

    stopped: bool,

    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ReaderSession {
    /// Segment and align `selection` and prepare playback on `output`.
    ///
    /// Returns the session and a receiver for [`SessionEvent`]s.
    pub fn new(
        selection: &Selection,
        settings: &ReaderSettings,
        output: Box<dyn AudioOutput>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), VoiceError> {
        let sentences = SentenceList::from_text(&selection.plain_text());
        if sentences.is_empty() {
            return Err(VoiceError::EmptyText);
        }

        let spans = selection.align(&sentences.to_strings());
        let unaligned = spans.iter().filter(|s| s.is_none()).count();
        if unaligned > 0 {
            tracing::debug!(unaligned, "Some sentences have no highlight range");
        }

        let (mut engine, engine_events) = PlaybackEngine::new(output);
        engine.set_total_sentences(sentences.len());
        let speed = engine.set_speed(settings.speed);

        let pipeline = SynthesisPipeline::new(sentences.clone(), PipelineConfig::from(settings));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tracing::info!(
            sentences = sentences.len(),
            words = sentences.total_words(),
            voice = %settings.voice,
            speed,
            "Reader session created"
        );

        let session = Self {
            sentences,
            spans,
            engine,
            engine_events,
            pipeline,
            pacing: Pacing::new(settings.words_per_minute),
            speed,
            stall_timeout: settings.stall_timeout_ms.map(Duration::from_millis),
            awaiting_since: None,
            stall_reported: false,
            reported_playing: None,
            started: false,
            finished: false,
            stopped: false,
            event_tx,
        };
        Ok((session, event_rx))
    }

    /// Session over plain text, one container per paragraph.
    pub fn from_text(
        text: &str,
        settings: &ReaderSettings,
        output: Box<dyn AudioOutput>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), VoiceError> {
        Self::new(&Selection::from_paragraphs(text), settings, output)
    }

    pub fn attach_transport(&mut self, transport: Arc<dyn SynthesisTransport>) {
        self.pipeline.attach_transport(transport);
    }

    #[must_use]
    pub const fn sentences(&self) -> &SentenceList {
        &self.sentences
    }

    #[must_use]
    pub fn spans(&self) -> &[Option<SourceRange>] {
        &self.spans
    }

    #[must_use]
    pub const fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    #[must_use]
    pub const fn pipeline(&self) -> &SynthesisPipeline {
        &self.pipeline
    }

    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Request the first batch and start waiting for its audio.
    pub fn start(&mut self) {
        if self.started || self.stopped {
            return;
        }
        self.started = true;
        let requested = self.pipeline.request_batch(0, self.speed);
        self.report(requested);
        self.engine.restart_at(0);
        self.flush();
    }

    /// Abandon the session: invalidate in-flight work, silence and forget
    /// all audio, clear highlights.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.pipeline.advance_generation();
        self.engine.reset();
        self.awaiting_since = None;
        while self.engine_events.try_recv().is_ok() {}
        self.emit(SessionEvent::Stopped);
        self.sync_play_state();
        tracing::info!("Reader session stopped");
    }

    // ── Handlers ───────────────────────────────────────────────────

    /// Handle a message from the transport. A current-generation chunk
    /// yields the decode work to run.
    pub fn handle_inbound(&mut self, message: InboundMessage) -> Option<DecodeJob> {
        if self.stopped {
            return None;
        }
        match message {
            InboundMessage::Chunk(chunk) => {
                if !self.pipeline.is_current(chunk.generation) {
                    tracing::debug!(
                        index = chunk.index,
                        generation = %chunk.generation,
                        current = %self.pipeline.generation(),
                        "Discarding stale chunk"
                    );
                    return None;
                }
                let requested = self.pipeline.prefetch(chunk.index, self.speed);
                self.report(requested);
                Some(DecodeJob {
                    generation: chunk.generation,
                    index: chunk.index,
                    bytes: chunk.audio,
                })
            }
            InboundMessage::BatchComplete { generation } => {
                let requested = self.pipeline.on_batch_complete(generation, self.speed);
                self.report(requested);
                None
            }
            InboundMessage::Error {
                generation,
                index,
                message,
            } => {
                if generation.is_some_and(|g| !self.pipeline.is_current(g)) {
                    tracing::debug!(?generation, "Discarding stale error");
                    return None;
                }
                tracing::warn!(?generation, ?index, %message, "Synthesis error");
                self.emit(SessionEvent::status(message));
                None
            }
            InboundMessage::Undelivered {
                generation,
                start_index,
                message,
            } => {
                if !self.pipeline.is_current(generation) {
                    tracing::debug!(%generation, start_index, "Discarding stale delivery failure");
                    return None;
                }
                tracing::warn!(%generation, start_index, %message, "Batch request was not delivered");
                self.pipeline.retreat_frontier(start_index);
                self.emit(SessionEvent::status(message));
                None
            }
            InboundMessage::Connection { connected } => {
                let current = self.engine.current_index().unwrap_or(0);
                if connected {
                    // Re-request whatever was lost with the old socket.
                    if self.engine.state() == PlaybackState::AwaitingAudio {
                        let requested = self.pipeline.prefetch(current, self.speed);
                        self.report(requested);
                    }
                } else {
                    // Requests in flight died with the socket; buffered audio did not.
                    let lost = self.first_unbuffered_from(current);
                    self.pipeline.retreat_frontier(lost);
                    self.emit(SessionEvent::status("Disconnected from TTS server"));
                }
                None
            }
        }
    }

    /// Store decoded audio unless it belongs to a superseded generation.
    pub fn handle_decoded(&mut self, outcome: DecodeOutcome) {
        if self.stopped {
            return;
        }
        if !self.pipeline.is_current(outcome.generation) {
            tracing::debug!(index = outcome.index, generation = %outcome.generation, "Discarding stale decode");
            return;
        }
        match outcome.result {
            Ok(audio) => self.engine.add_decoded(outcome.index, audio),
            Err(e) => tracing::warn!(index = outcome.index, error = %e, "Skipping undecodable chunk"),
        }
        self.flush();
    }

    /// The output reports that a sound ended on its own.
    pub fn handle_playback_ended(&mut self, handle: PlaybackHandle) {
        if self.stopped {
            return;
        }
        self.engine.on_playback_ended(handle);
        self.flush();
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        if self.stopped {
            return;
        }
        tracing::debug!(?command, "Session command");
        match command {
            SessionCommand::TogglePlayPause => {
                self.engine.toggle_play_pause();
            }
            SessionCommand::Play => self.engine.play(),
            SessionCommand::Pause => self.engine.pause(),
            SessionCommand::Skip(delta) => self.skip(delta),
            SessionCommand::SpeedUp => self.set_speed(self.speed + SPEED_STEP),
            SessionCommand::SpeedDown => self.set_speed(self.speed - SPEED_STEP),
            SessionCommand::SetSpeed(speed) => self.set_speed(speed),
            SessionCommand::SetVoice(voice) => self.set_voice(voice),
            SessionCommand::Stop => {
                self.stop();
                return;
            }
        }
        self.flush();
    }

    /// Report a stall once the current sentence has waited longer than the
    /// configured timeout. Nothing is retried.
    pub fn check_stall(&mut self, now: Instant) {
        let (Some(timeout), Some((index, since))) = (self.stall_timeout, self.awaiting_since) else {
            return;
        };
        if self.stall_reported {
            return;
        }
        let still_waiting = self.engine.state() == PlaybackState::AwaitingAudio
            && self.engine.current_index() == Some(index)
            && self.engine.is_playing();
        if !still_waiting {
            self.awaiting_since = None;
            return;
        }
        if now.saturating_duration_since(since) >= timeout {
            self.stall_reported = true;
            tracing::warn!(index, waited_ms = timeout.as_millis(), "Audio has not arrived");
            self.emit(SessionEvent::status(format!(
                "Still waiting for audio of sentence {} of {}",
                index + 1,
                self.sentences.len()
            )));
        }
    }

    // ── Event loop ─────────────────────────────────────────────────

    /// Start the session and drive it until it finishes or is stopped.
    ///
    /// Chunks are decoded on the blocking pool. A closed command channel
    /// leaves playback running to the end.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut ended: mpsc::UnboundedReceiver<PlaybackHandle>,
    ) {
        let (decoded_tx, mut decoded_rx) = mpsc::unbounded_channel();
        let tick = self
            .stall_timeout
            .map_or(Duration::from_secs(60), |t| (t / 4).max(Duration::from_millis(50)));
        let mut stall_ticker = tokio::time::interval(tick);
        stall_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        self.start();

        while !self.stopped && !self.finished {
            tokio::select! {
                Some(message) = inbound.recv() => {
                    if let Some(job) = self.handle_inbound(message) {
                        spawn_decode(job, decoded_tx.clone());
                    }
                }
                Some(outcome) = decoded_rx.recv() => self.handle_decoded(outcome),
                Some(handle) = ended.recv() => self.handle_playback_ended(handle),
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => commands_open = false,
                },
                _ = stall_ticker.tick(), if self.stall_timeout.is_some() => {
                    self.check_stall(Instant::now());
                }
                else => break,
            }
        }

        tracing::debug!(finished = self.finished, stopped = self.stopped, "Session loop exited");
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn skip(&mut self, delta: isize) {
        let Some(target) = self.engine.skip_target(delta) else {
            return;
        };
        if Some(target) == self.engine.current_index() {
            return;
        }
        let requested = self.pipeline.ensure_requested(&self.engine, target, self.speed);
        self.report(requested);
        self.engine.skip_sentences(delta);
    }

    fn set_speed(&mut self, speed: f32) {
        let speed = clamp_speed(speed);
        if (speed - self.speed).abs() < f32::EPSILON {
            return;
        }
        self.speed = self.engine.set_speed(speed);
        tracing::info!(speed = self.speed, "Speed changed");
        let regenerated = self.pipeline.cancel_and_regenerate(&mut self.engine, self.speed);
        self.report(regenerated);
    }

    fn set_voice(&mut self, voice: String) {
        if voice.trim().is_empty() || voice == self.pipeline.voice() {
            return;
        }
        tracing::info!(%voice, "Voice changed");
        self.emit(SessionEvent::status(format!("Voice: {voice}")));
        self.pipeline.set_voice(voice);
        let regenerated = self.pipeline.cancel_and_regenerate(&mut self.engine, self.speed);
        self.report(regenerated);
    }

    /// Translate engine events into session events and follow-up requests.
    fn flush(&mut self) {
        while let Ok(event) = self.engine_events.try_recv() {
            match event {
                PlaybackEvent::SentenceStarted { index } => {
                    self.finished = false;
                    let span = self.spans.get(index).copied().flatten();
                    self.emit(SessionEvent::SentenceStarted { index, span });
                    self.track_awaiting(index);
                    let requested = self.pipeline.prefetch(index, self.speed);
                    self.report(requested);
                }
                PlaybackEvent::Progress { index, total } => {
                    let (elapsed, remaining) = self.estimate_times(index);
                    self.emit(SessionEvent::Progress {
                        index,
                        total,
                        elapsed,
                        remaining,
                    });
                }
                PlaybackEvent::Finished => {
                    self.finished = true;
                    self.awaiting_since = None;
                    self.emit(SessionEvent::Finished);
                }
                PlaybackEvent::OutputFailed { message, .. } => {
                    self.emit(SessionEvent::status(format!("Audio output error: {message}")));
                }
            }
        }
        self.sync_play_state();
    }

    fn first_unbuffered_from(&self, index: usize) -> usize {
        (index..self.sentences.len())
            .find(|&i| !self.engine.has_buffer(i))
            .unwrap_or(self.sentences.len())
    }

    /// Every announcement in `AwaitingAudio` starts a fresh wait, including a
    /// resume of the same sentence.
    fn track_awaiting(&mut self, index: usize) {
        if self.engine.state() == PlaybackState::AwaitingAudio {
            self.awaiting_since = Some((index, Instant::now()));
            self.stall_reported = false;
        } else {
            self.awaiting_since = None;
        }
    }

    /// Time before and from `index`: decoded durations where audio arrived,
    /// word-count estimates elsewhere.
    fn estimate_times(&self, index: usize) -> (Duration, Duration) {
        let mut elapsed = Duration::ZERO;
        let mut remaining = Duration::ZERO;
        for sentence in self.sentences.iter() {
            let duration = self
                .engine
                .buffered_duration(sentence.index)
                .unwrap_or_else(|| self.pacing.duration_for(sentence.words, self.speed));
            if sentence.index < index {
                elapsed += duration;
            } else {
                remaining += duration;
            }
        }
        (elapsed, remaining)
    }

    fn sync_play_state(&mut self) {
        let playing = self.engine.is_playing();
        if self.reported_playing != Some(playing) {
            self.reported_playing = Some(playing);
            self.emit(SessionEvent::PlayState { playing });
        }
    }

    fn report<T>(&self, result: Result<T, TransportError>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Synthesis request failed");
            self.emit(SessionEvent::status(e.to_string()));
        }
    }

    /// Emit an event; a dropped receiver is logged and otherwise ignored.
    fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::warn!("Session event receiver dropped");
        }
    }
}

fn spawn_decode(job: DecodeJob, decoded_tx: mpsc::UnboundedSender<DecodeOutcome>) {
    tokio::spawn(async move {
        match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(outcome) => {
                let _ = decoded_tx.send(outcome);
            }
            Err(e) => tracing::error!(error = %e, "Decode task failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use readflow_core::{AudioChunk, OutboundMessage};

    use super::*;
    use crate::audio::fixtures::wav_bytes;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl SynthesisTransport for RecordingTransport {
        fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeOutput {
        started: Arc<Mutex<Vec<PlaybackHandle>>>,
    }

    impl AudioOutput for FakeOutput {
        fn start(&mut self, handle: PlaybackHandle, _: &DecodedAudio) -> Result<(), VoiceError> {
            self.started.lock().unwrap().push(handle);
            Ok(())
        }

        fn stop(&mut self, _: PlaybackHandle) {}
    }

    fn session(
        text: &str,
        settings: &ReaderSettings,
    ) -> (
        ReaderSession,
        mpsc::UnboundedReceiver<SessionEvent>,
        Arc<RecordingTransport>,
        FakeOutput,
    ) {
        let output = FakeOutput::default();
        let (mut session, rx) =
            ReaderSession::from_text(text, settings, Box::new(output.clone())).unwrap();
        let transport = Arc::new(RecordingTransport::default());
        session.attach_transport(transport.clone());
        (session, rx, transport, output)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn chunk(generation: GenerationId, index: usize) -> InboundMessage {
        InboundMessage::Chunk(AudioChunk {
            generation,
            index,
            audio: wav_bytes(100, 1_000, 0),
        })
    }

    fn deliver(session: &mut ReaderSession, message: InboundMessage) {
        if let Some(job) = session.handle_inbound(message) {
            session.handle_decoded(job.run());
        }
    }

    const TEXT: &str = "One. Two. Three. Four. Five. Six. Seven.";

    #[test]
    fn empty_text_is_rejected() {
        let result = ReaderSession::from_text("  \n ", &ReaderSettings::default(), Box::new(FakeOutput::default()));
        assert!(matches!(result, Err(VoiceError::EmptyText)));
    }

    #[test]
    fn start_requests_first_batch_and_highlights_first_sentence() {
        let (mut session, mut rx, transport, _) = session(TEXT, &ReaderSettings::default());
        session.start();

        let sent = transport.sent.lock().unwrap();
        assert!(matches!(
            sent.as_slice(),
            [OutboundMessage::SendSentences(r)] if r.start_index == 0 && r.sentences.len() == 5
        ));

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::SentenceStarted {
            index: 0,
            span: session.spans()[0]
        }));
        assert!(events.contains(&SessionEvent::PlayState { playing: true }));
        assert!(session.spans()[0].is_some());
    }

    #[test]
    fn stale_chunk_populates_nothing() {
        let (mut session, _rx, _, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        session.handle_command(SessionCommand::SetSpeed(1.0));
        assert_eq!(session.pipeline().generation(), GenerationId(1));

        assert!(session.handle_inbound(chunk(GenerationId(0), 0)).is_none());
        assert!(session.engine().buffered_indices().is_empty());
    }

    #[test]
    fn decode_finishing_after_regeneration_is_discarded() {
        let (mut session, _rx, _, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        let job = session.handle_inbound(chunk(GenerationId(0), 0)).unwrap();

        session.handle_command(SessionCommand::SpeedUp);
        session.handle_decoded(job.run());

        assert!(session.engine().buffered_indices().is_empty());
        assert_eq!(session.engine().state(), PlaybackState::AwaitingAudio);
    }

    #[test]
    fn chunks_drive_playback_and_progress() {
        let (mut session, mut rx, _, output) = session(TEXT, &ReaderSettings::default());
        session.start();
        deliver(&mut session, chunk(GenerationId(0), 0));

        assert_eq!(session.engine().state(), PlaybackState::Playing);
        let handle = *output.started.lock().unwrap().last().unwrap();
        drain(&mut rx);

        session.handle_playback_ended(handle);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Progress { index: 1, total: 7, elapsed, .. } if *elapsed == Duration::from_millis(100)
        )));
        assert_eq!(session.engine().state(), PlaybackState::AwaitingAudio);
    }

    #[test]
    fn batch_completion_requests_next_batch() {
        let (mut session, _rx, transport, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        session.handle_inbound(InboundMessage::BatchComplete {
            generation: GenerationId(0),
        });
        assert_eq!(session.pipeline().fetched_up_to(), Some(6));
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn speed_commands_step_and_clamp() {
        let settings = ReaderSettings {
            speed: 1.75,
            ..Default::default()
        };
        let (mut session, _rx, transport, _) = session(TEXT, &settings);
        session.start();

        session.handle_command(SessionCommand::SpeedUp);
        assert!((session.speed() - 2.0).abs() < f32::EPSILON);
        session.handle_command(SessionCommand::SpeedUp);
        assert!((session.speed() - 2.0).abs() < f32::EPSILON);
        assert_eq!(session.pipeline().generation(), GenerationId(1));

        let cancels = transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Cancel { .. }))
            .count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn voice_change_regenerates_with_new_voice() {
        let (mut session, mut rx, transport, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        session.handle_command(SessionCommand::SetVoice("bm_george".into()));

        assert_eq!(session.pipeline().generation(), GenerationId(1));
        assert!(matches!(
            transport.sent.lock().unwrap().last(),
            Some(OutboundMessage::SendSentences(r)) if r.voice == "bm_george" && r.start_index == 0
        ));
        assert!(drain(&mut rx).contains(&SessionEvent::status("Voice: bm_george")));
    }

    #[test]
    fn skip_past_frontier_requests_target() {
        let (mut session, _rx, transport, _) = session(TEXT, &ReaderSettings {
            batch_size: 2,
            prefetch_lead: 0,
            ..Default::default()
        });
        session.start();
        session.handle_command(SessionCommand::Skip(5));

        assert_eq!(session.engine().current_index(), Some(5));
        assert!(matches!(
            transport.sent.lock().unwrap().last(),
            Some(OutboundMessage::SendSentences(r)) if r.start_index == 5
        ));
    }

    fn batch_starts(transport: &RecordingTransport) -> Vec<usize> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::SendSentences(r) => Some(r.start_index),
                OutboundMessage::Cancel { .. } => None,
            })
            .collect()
    }

    /// Twelve sentences with audio for 0..=4 buffered and 5..=9 requested.
    fn twelve_with_first_batch_buffered() -> (
        ReaderSession,
        mpsc::UnboundedReceiver<SessionEvent>,
        Arc<RecordingTransport>,
        FakeOutput,
    ) {
        let text = (1..=12)
            .map(|i| format!("Sentence {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let (mut session, rx, transport, output) = session(&text, &ReaderSettings::default());
        session.start();
        for index in 0..5 {
            deliver(&mut session, chunk(GenerationId(0), index));
        }
        assert_eq!(session.pipeline().fetched_up_to(), Some(9));
        assert_eq!(batch_starts(&transport), vec![0, 5]);
        (session, rx, transport, output)
    }

    #[test]
    fn undelivered_batch_restores_previous_frontier() {
        let (mut session, mut rx, transport, output) = twelve_with_first_batch_buffered();
        session.handle_inbound(InboundMessage::Undelivered {
            generation: GenerationId(0),
            start_index: 5,
            message: "Cannot connect to TTS server".into(),
        });

        assert_eq!(session.pipeline().fetched_up_to(), Some(4));
        assert_eq!(session.engine().buffered_indices(), vec![0, 1, 2, 3, 4]);
        assert!(drain(&mut rx).contains(&SessionEvent::status("Cannot connect to TTS server")));

        // Buffered audio is never asked for again.
        let handle = *output.started.lock().unwrap().last().unwrap();
        session.handle_playback_ended(handle);
        assert_eq!(batch_starts(&transport), vec![0, 5]);

        // The lost batch goes out again once playback nears it.
        let handle = *output.started.lock().unwrap().last().unwrap();
        session.handle_playback_ended(handle);
        assert_eq!(session.engine().current_index(), Some(2));
        assert_eq!(batch_starts(&transport), vec![0, 5, 5]);
    }

    #[test]
    fn stale_undelivered_batch_is_ignored() {
        let (mut session, mut rx, _, _) = twelve_with_first_batch_buffered();
        drain(&mut rx);
        session.handle_inbound(InboundMessage::Undelivered {
            generation: GenerationId(3),
            start_index: 0,
            message: "Cannot connect to TTS server".into(),
        });
        assert_eq!(session.pipeline().fetched_up_to(), Some(9));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn disconnect_keeps_buffered_sentences_requested() {
        let (mut session, _rx, transport, output) = twelve_with_first_batch_buffered();
        session.handle_inbound(InboundMessage::Connection { connected: false });
        assert_eq!(session.pipeline().fetched_up_to(), Some(4));

        session.handle_inbound(InboundMessage::Connection { connected: true });
        let handle = *output.started.lock().unwrap().last().unwrap();
        session.handle_playback_ended(handle);
        assert_eq!(batch_starts(&transport), vec![0, 5]);
    }

    #[test]
    fn server_error_leaves_frontier_alone() {
        let (mut session, mut rx, _, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        session.handle_inbound(InboundMessage::Error {
            generation: Some(GenerationId(0)),
            index: None,
            message: "No sentences provided".into(),
        });

        assert_eq!(session.pipeline().fetched_up_to(), Some(4));
        assert!(drain(&mut rx).contains(&SessionEvent::status("No sentences provided")));
    }

    #[test]
    fn reconnect_re_requests_from_current_sentence() {
        let (mut session, _rx, transport, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        session.handle_inbound(InboundMessage::Connection { connected: true });
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        session.handle_inbound(InboundMessage::Connection { connected: false });
        assert_eq!(session.pipeline().fetched_up_to(), None);

        session.handle_inbound(InboundMessage::Connection { connected: true });
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[1], OutboundMessage::SendSentences(r) if r.start_index == 0));
    }

    #[test]
    fn stale_errors_are_silent() {
        let (mut session, mut rx, _, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        drain(&mut rx);
        session.handle_inbound(InboundMessage::Error {
            generation: Some(GenerationId(7)),
            index: Some(1),
            message: "boom".into(),
        });
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn stop_invalidates_and_clears() {
        let (mut session, mut rx, _, _) = session(TEXT, &ReaderSettings::default());
        session.start();
        deliver(&mut session, chunk(GenerationId(0), 0));
        session.handle_command(SessionCommand::Stop);

        assert!(session.is_stopped());
        assert_eq!(session.engine().state(), PlaybackState::Idle);
        assert!(session.engine().buffered_indices().is_empty());
        assert_eq!(session.pipeline().generation(), GenerationId(1));
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::Stopped));
        assert_eq!(events.last(), Some(&SessionEvent::PlayState { playing: false }));

        assert!(session.handle_inbound(chunk(GenerationId(1), 1)).is_none());
    }

    #[tokio::test]
    async fn run_waits_for_input_until_stopped() {
        let (session, mut rx, transport, _) = session(TEXT, &ReaderSettings::default());
        let (_inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (_ended_tx, ended_rx) = mpsc::unbounded_channel();

        let mut task = tokio_test::task::spawn(session.run(inbound_rx, commands_rx, ended_rx));
        tokio_test::assert_pending!(task.poll());
        assert_eq!(batch_starts(&transport), vec![0]);

        commands_tx.send(SessionCommand::Stop).unwrap();
        assert!(task.is_woken());
        tokio_test::assert_ready!(task.poll());
        assert!(drain(&mut rx).contains(&SessionEvent::Stopped));
    }

    #[test]
    fn stall_is_reported_once() {
        let settings = ReaderSettings {
            stall_timeout_ms: Some(1_000),
            ..Default::default()
        };
        let (mut session, mut rx, _, _) = session(TEXT, &settings);
        session.start();
        drain(&mut rx);

        let later = Instant::now() + Duration::from_secs(5);
        session.check_stall(later);
        session.check_stall(later);

        let stalls = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Status { message } if message.starts_with("Still waiting")))
            .count();
        assert_eq!(stalls, 1);
    }

    #[test]
    fn resuming_a_wait_restarts_the_stall_clock() {
        let settings = ReaderSettings {
            stall_timeout_ms: Some(1_000),
            ..Default::default()
        };
        let (mut session, mut rx, _, _) = session(TEXT, &settings);
        session.start();
        session.check_stall(Instant::now() + Duration::from_secs(5));

        session.handle_command(SessionCommand::Pause);
        session.handle_command(SessionCommand::Play);
        session.check_stall(Instant::now());
        session.check_stall(Instant::now() + Duration::from_secs(5));

        let stalls = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Status { message } if message.starts_with("Still waiting")))
            .count();
        assert_eq!(stalls, 2);
    }

    #[test]
    fn no_stall_once_audio_arrives() {
        let settings = ReaderSettings {
            stall_timeout_ms: Some(1_000),
            ..Default::default()
        };
        let (mut session, mut rx, _, _) = session(TEXT, &settings);
        session.start();
        deliver(&mut session, chunk(GenerationId(0), 0));
        drain(&mut rx);

        session.check_stall(Instant::now() + Duration::from_secs(5));
        assert!(drain(&mut rx).is_empty());
    }
}
