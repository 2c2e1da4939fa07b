//! Text processing: segmentation, pacing estimates and highlight alignment.

pub mod align;
mod pacing;
mod segmenter;

pub use align::{ContainerId, RunPosition, Selection, SourceRange, TextRun, align_sentences};
pub use pacing::{DEFAULT_WORDS_PER_MINUTE, Pacing};
pub use segmenter::{Sentence, SentenceList, segment, word_count};
