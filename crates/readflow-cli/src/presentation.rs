//! Terminal rendering of session events.

use std::time::Duration;

use readflow_core::{SentenceList, SessionEvent};
use tokio::sync::mpsc;

/// `m:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Stateful renderer; collapses the repeated start a sentence gets when its
/// audio arrives after it became current.
pub struct EventRenderer {
    sentences: SentenceList,
    last_started: Option<usize>,
}

impl EventRenderer {
    pub const fn new(sentences: SentenceList) -> Self {
        Self {
            sentences,
            last_started: None,
        }
    }

    /// Line to print for `event`, if any.
    pub fn render(&mut self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::SentenceStarted { index, .. } => {
                if self.last_started == Some(*index) {
                    return None;
                }
                self.last_started = Some(*index);
                let text = self.sentences.get(*index).map_or("", |s| s.text.as_str());
                Some(format!("{:>4}  {text}", index + 1))
            }
            SessionEvent::Progress {
                index,
                total,
                remaining,
                ..
            } => {
                tracing::debug!(
                    sentence = index + 1,
                    total,
                    remaining = %format_duration(*remaining),
                    "Progress"
                );
                None
            }
            SessionEvent::PlayState { playing } => {
                Some(if *playing { "      [playing]" } else { "      [paused]" }.to_owned())
            }
            SessionEvent::Finished => {
                self.last_started = None;
                Some("Finished.".to_owned())
            }
            SessionEvent::Stopped => Some("Stopped.".to_owned()),
            SessionEvent::Status { message } => Some(format!("  ! {message}")),
        }
    }
}

/// Print events until the session drops its sender.
pub async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>, sentences: SentenceList) {
    let mut renderer = EventRenderer::new(sentences);
    while let Some(event) = events.recv().await {
        if let Some(line) = renderer.render(&event) {
            println!("{line}");
        }
    }
}
