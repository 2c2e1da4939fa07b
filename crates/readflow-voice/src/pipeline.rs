//! Synthesis pipeline: batching, prefetch and invalidation of requests.
//!
//! Sentences are requested from the synthesis service in fixed-size batches.
//! The *fetch frontier* is the highest sentence index already requested; a new
//! batch is only sent past it. Every request carries the current
//! [`GenerationId`]; changing voice or speed moves to a new generation, and
//! anything still in flight for an older one is discarded on arrival.

use std::sync::Arc;

use readflow_core::{
    GenerationId, OutboundMessage, ReaderSettings, SentenceList, SynthesisRequest,
    SynthesisTransport, TransportError, clamp_speed,
};

use crate::engine::PlaybackEngine;

/// Configuration for the synthesis pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Voice id sent with every batch.
    pub voice: String,

    /// Sentences per request.
    pub batch_size: usize,

    /// Prefetch when playback is within this many sentences of the frontier.
    pub prefetch_lead: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&ReaderSettings::default())
    }
}

impl From<&ReaderSettings> for PipelineConfig {
    fn from(settings: &ReaderSettings) -> Self {
        Self {
            voice: settings.voice.clone(),
            batch_size: settings.batch_size.max(1),
            prefetch_lead: settings.prefetch_lead,
        }
    }
}

pub struct SynthesisPipeline {
    sentences: SentenceList,

    transport: Option<Arc<dyn SynthesisTransport>>,

    generation: GenerationId,

    /// Highest index already requested, `None` before the first batch.
    fetched_up_to: Option<usize>,

    config: PipelineConfig,
}

impl SynthesisPipeline {
    #[must_use]
    pub fn new(sentences: SentenceList, config: PipelineConfig) -> Self {
        Self {
            sentences,
            transport: None,
            generation: GenerationId::default(),
            fetched_up_to: None,
            config,
        }
    }

    pub fn attach_transport(&mut self, transport: Arc<dyn SynthesisTransport>) {
        self.transport = Some(transport);
    }

    pub fn detach_transport(&mut self) {
        self.transport = None;
    }

    #[must_use]
    pub const fn generation(&self) -> GenerationId {
        self.generation
    }

    #[must_use]
    pub const fn fetched_up_to(&self) -> Option<usize> {
        self.fetched_up_to
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.config.voice
    }

    /// Voice for subsequent batches. Call
    /// [`cancel_and_regenerate`](Self::cancel_and_regenerate) to apply it to
    /// audio already requested.
    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.config.voice = voice.into();
    }

    #[must_use]
    pub const fn sentences(&self) -> &SentenceList {
        &self.sentences
    }

    /// Whether something tagged `generation` is still wanted.
    #[must_use]
    pub fn is_current(&self, generation: GenerationId) -> bool {
        self.generation == generation
    }

    /// Move to a new generation, invalidating everything in flight.
    pub fn advance_generation(&mut self) -> GenerationId {
        self.generation = self.generation.next();
        tracing::debug!(generation = %self.generation, "Advanced generation");
        self.generation
    }

    /// Forget what has been requested so the next batch starts at `index`.
    pub fn rewind_frontier(&mut self, index: usize) {
        self.fetched_up_to = index.checked_sub(1);
    }

    /// Pull the frontier back so `index` counts as unrequested. Never moves it
    /// forward.
    pub fn retreat_frontier(&mut self, index: usize) {
        if self.is_requested(index) {
            self.fetched_up_to = index.checked_sub(1);
        }
    }

    /// Whether `index` has already been requested.
    #[must_use]
    pub fn is_requested(&self, index: usize) -> bool {
        self.fetched_up_to.is_some_and(|frontier| index <= frontier)
    }

    /// Request the batch starting at `from`.
    ///
    /// No-op (returns `Ok(false)`) without a transport, past the last
    /// sentence, or at or before the frontier. The frontier only advances once
    /// the transport accepted the message.
    pub fn request_batch(&mut self, from: usize, speed: f32) -> Result<bool, TransportError> {
        let Some(transport) = &self.transport else {
            return Ok(false);
        };
        if from >= self.sentences.len() || self.is_requested(from) {
            return Ok(false);
        }

        let to = (from + self.config.batch_size).min(self.sentences.len());
        let speed = clamp_speed(speed);
        let request = SynthesisRequest {
            sentences: self.sentences.texts(from, to),
            voice: self.config.voice.clone(),
            speed,
            start_index: from,
            generation: self.generation,
        };

        transport.send(OutboundMessage::SendSentences(request))?;
        self.fetched_up_to = Some(to - 1);
        tracing::info!(
            from,
            to = to - 1,
            generation = %self.generation,
            speed,
            "Requested batch"
        );
        Ok(true)
    }

    /// Request the next batch when playback at `trigger` is within the
    /// prefetch lead of the frontier.
    pub fn prefetch(&mut self, trigger: usize, speed: f32) -> Result<bool, TransportError> {
        let next = self.fetched_up_to.map_or(0, |frontier| frontier + 1);
        if next >= self.sentences.len() {
            return Ok(false);
        }
        let near_frontier = self
            .fetched_up_to
            .is_none_or(|frontier| trigger + self.config.prefetch_lead >= frontier);
        if !near_frontier {
            return Ok(false);
        }
        self.request_batch(next, speed)
    }

    /// A batch of `generation` finished; request the next one if any remain.
    pub fn on_batch_complete(
        &mut self,
        generation: GenerationId,
        speed: f32,
    ) -> Result<bool, TransportError> {
        if !self.is_current(generation) {
            tracing::debug!(%generation, current = %self.generation, "Ignoring stale batch completion");
            return Ok(false);
        }
        let next = self.fetched_up_to.map_or(0, |frontier| frontier + 1);
        self.request_batch(next, speed)
    }

    /// Make sure audio for `target` is on its way before jumping to it.
    ///
    /// Re-requests from `target` only when it is neither buffered nor covered
    /// by an outstanding request. Indices behind the playback cursor count as
    /// lost, since everything before the cursor was requested earlier.
    pub fn ensure_requested(
        &mut self,
        engine: &PlaybackEngine,
        target: usize,
        speed: f32,
    ) -> Result<bool, TransportError> {
        if engine.has_buffer(target) {
            return Ok(false);
        }
        let behind_cursor = engine.current_index().is_some_and(|current| target < current);
        if self.is_requested(target) && !behind_cursor {
            return Ok(false);
        }
        let previous = self.fetched_up_to;
        self.rewind_frontier(target);
        let sent = self.request_batch(target, speed);
        if !matches!(sent, Ok(true)) {
            self.fetched_up_to = previous;
        }
        sent
    }

    /// Re-synthesize from the current sentence under a new generation.
    ///
    /// Cancels outstanding work, discards audio from the current sentence on
    /// (whatever is sounding keeps sounding), requests a fresh batch and
    /// re-arms playback of the current sentence. Buffers and frontier are
    /// reset even if the new request fails, so the next prefetch retries.
    pub fn cancel_and_regenerate(
        &mut self,
        engine: &mut PlaybackEngine,
        speed: f32,
    ) -> Result<(), TransportError> {
        if self.transport.is_none() || self.sentences.is_empty() {
            return Ok(());
        }
        let index = engine.current_index().unwrap_or(0);
        let superseded = self.generation;
        self.advance_generation();

        if let Some(transport) = &self.transport {
            if let Err(e) = transport.send(OutboundMessage::Cancel {
                generation: superseded,
            }) {
                tracing::warn!(generation = %superseded, error = %e, "Failed to send cancel");
            }
        }

        engine.clear_buffers_from(index);
        self.rewind_frontier(index);
        let requested = self.request_batch(index, speed);
        engine.restart_at(index);

        tracing::info!(index, generation = %self.generation, speed, "Regenerating from current sentence");
        requested.map(|_| ())
    }
}
