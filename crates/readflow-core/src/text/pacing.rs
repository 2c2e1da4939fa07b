//! Word-count based duration estimates.
//!
//! Advisory only: once decoded audio for a sentence exists, its real duration
//! wins. Used for progress display before audio has arrived.

use std::time::Duration;

use super::segmenter::SentenceList;

/// Speaking rate of the synthesis voice at 1x speed.
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 155;

/// Linear pacing model: `words / (wpm * speed)` minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub words_per_minute: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }
}

impl Pacing {
    #[must_use]
    pub const fn new(words_per_minute: u32) -> Self {
        Self { words_per_minute }
    }

    /// Estimated time to speak `words` words at `speed`.
    #[must_use]
    pub fn duration_for(&self, words: usize, speed: f32) -> Duration {
        let rate = f64::from(self.words_per_minute) * f64::from(speed);
        if words == 0 || rate <= 0.0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let seconds = words as f64 * 60.0 / rate;
        Duration::from_secs_f64(seconds)
    }

    /// Estimated time already spoken before sentence `index`.
    #[must_use]
    pub fn estimate_elapsed(&self, sentences: &SentenceList, index: usize, speed: f32) -> Duration {
        self.duration_for(sentences.words_in(0, index), speed)
    }

    /// Estimated time left from sentence `index` (inclusive) to the end.
    #[must_use]
    pub fn estimate_remaining(
        &self,
        sentences: &SentenceList,
        index: usize,
        speed: f32,
    ) -> Duration {
        self.duration_for(sentences.words_in(index, sentences.len()), speed)
    }
}
