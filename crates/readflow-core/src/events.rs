//! Events a reading session publishes to its control surface.
//!
//! Delivered in order over a channel; the surface renders highlights, progress
//! and status from them.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "sentence_started", "index": 3, "span": null }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::text::SourceRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sentence `index` became current. `span` is its highlight range, if the
    /// aligner located it.
    SentenceStarted {
        index: usize,
        span: Option<SourceRange>,
    },

    /// Position update, emitted alongside every sentence change.
    Progress {
        index: usize,
        total: usize,
        /// Estimated time spoken before `index`.
        elapsed: Duration,
        /// Estimated time left from `index` to the end.
        remaining: Duration,
    },

    /// Playing/paused flag changed.
    PlayState { playing: bool },

    /// The last sentence finished playing.
    Finished,

    /// The session was stopped; highlights should be cleared.
    Stopped,

    /// User-visible status line (connection problems, stalls, voice changes).
    Status { message: String },
}

impl SessionEvent {
    /// Shorthand for a [`SessionEvent::Status`].
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_type_tagged() {
        let json = serde_json::to_value(SessionEvent::PlayState { playing: true }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "play_state", "playing": true}));

        let json = serde_json::to_value(SessionEvent::SentenceStarted { index: 3, span: None })
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "sentence_started", "index": 3, "span": null})
        );
    }
}
