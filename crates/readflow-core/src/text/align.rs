//! Sentence → source range alignment for highlighting.
//!
//! The segmenter works on a normalized, flattened copy of the selection, so its
//! sentences cannot be mapped back to the source by offset arithmetic alone.
//! [`align_sentences`] re-locates every sentence inside the selected text runs:
//!
//! 1. Flatten the runs into one character sequence, inserting a block-boundary
//!    marker between runs owned by different structural containers, and keep a
//!    per-character map back to `(run, offset)`.
//! 2. Collapse whitespace (markers included) into single spaces and trim,
//!    remembering which flat character every normalized character came from.
//! 3. Search each normalized sentence forward from a cursor that only ever
//!    advances, so repeated wording maps to successive occurrences.
//! 4. Map the match back to the first and last real characters and build a
//!    [`SourceRange`] clamped to the run bounds.
//!
//! A sentence that cannot be located yields `None`; it never affects the
//! alignment of the sentences after it.

use serde::{Deserialize, Serialize};

/// Character inserted between runs that belong to different containers.
const BLOCK_MARKER: char = '\n';

/// Identity of the structural container (paragraph, list item, cell) a run
/// belongs to. Adjacent runs with different ids are separated by a block
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

/// One addressable run of source text covered by the selection.
///
/// `start_offset` is the position (in characters) of `text` inside the
/// underlying source node, so positions reported by the aligner are in the
/// node's own coordinates even when the selection starts mid-node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub container: ContainerId,
    pub start_offset: usize,
}

impl TextRun {
    pub fn new(text: impl Into<String>, container: ContainerId) -> Self {
        Self {
            text: text.into(),
            container,
            start_offset: 0,
        }
    }

    #[must_use]
    pub const fn with_start_offset(mut self, start_offset: usize) -> Self {
        self.start_offset = start_offset;
        self
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// One past the last addressable offset of this run.
    fn end_offset(&self) -> usize {
        self.start_offset + self.char_len()
    }
}

/// A position inside a run, in source-node character coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunPosition {
    pub run: usize,
    pub offset: usize,
}

/// Half-open source range `[start, end)` spanning one or more runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: RunPosition,
    pub end: RunPosition,
}

impl SourceRange {
    /// Materialize the source text this range covers.
    ///
    /// Returns `None` when the range does not fit the given runs.
    #[must_use]
    pub fn extract(&self, runs: &[TextRun]) -> Option<String> {
        if self.start.run > self.end.run {
            return None;
        }

        let mut out = String::new();
        for run_index in self.start.run..=self.end.run {
            let run = runs.get(run_index)?;
            let from = if run_index == self.start.run {
                self.start.offset.checked_sub(run.start_offset)?
            } else {
                0
            };
            let to = if run_index == self.end.run {
                self.end.offset.checked_sub(run.start_offset)?
            } else {
                run.char_len()
            };
            if from > to || to > run.char_len() {
                return None;
            }
            out.extend(run.text.chars().skip(from).take(to - from));
        }
        Some(out)
    }
}

/// The user's selection as an ordered list of text runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub runs: Vec<TextRun>,
}

impl Selection {
    #[must_use]
    pub const fn new(runs: Vec<TextRun>) -> Self {
        Self { runs }
    }

    /// Build a selection from plain text, one container per paragraph
    /// (paragraphs are separated by blank lines).
    #[must_use]
    pub fn from_paragraphs(text: &str) -> Self {
        let mut runs = Vec::new();
        let mut paragraph = String::new();
        let mut container = 0u64;

        for line in text.lines() {
            if line.trim().is_empty() {
                if !paragraph.is_empty() {
                    runs.push(TextRun::new(std::mem::take(&mut paragraph), ContainerId(container)));
                    container += 1;
                }
                continue;
            }
            if !paragraph.is_empty() {
                paragraph.push('\n');
            }
            paragraph.push_str(line);
        }
        if !paragraph.is_empty() {
            runs.push(TextRun::new(paragraph, ContainerId(container)));
        }

        Self { runs }
    }

    /// The selection's text as the segmenter should see it: run texts in
    /// order, with a line break at every container boundary.
    #[must_use]
    pub fn plain_text(&self) -> String {
        FlatText::build(&self.runs).chars.into_iter().collect()
    }

    /// Align `sentences` against this selection.
    #[must_use]
    pub fn align<S: AsRef<str>>(&self, sentences: &[S]) -> Vec<Option<SourceRange>> {
        align_sentences(&self.runs, sentences)
    }
}

/// Step 1: the flattened selection with its map back into the runs.
struct FlatText {
    chars: Vec<char>,
    /// `None` for block markers.
    origin: Vec<Option<RunPosition>>,
}

impl FlatText {
    fn build(runs: &[TextRun]) -> Self {
        let mut chars = Vec::new();
        let mut origin = Vec::new();

        for (run_index, run) in runs.iter().enumerate() {
            let crosses_block = run_index > 0 && runs[run_index - 1].container != run.container;
            if crosses_block {
                chars.push(BLOCK_MARKER);
                origin.push(None);
            }
            for (i, ch) in run.text.chars().enumerate() {
                chars.push(ch);
                origin.push(Some(RunPosition {
                    run: run_index,
                    offset: run.start_offset + i,
                }));
            }
        }

        Self { chars, origin }
    }
}

/// Step 2: whitespace-collapsed, trimmed text with its map back into the flat
/// text.
struct NormalizedText {
    chars: Vec<char>,
    to_flat: Vec<usize>,
}

impl NormalizedText {
    fn build(flat: &[char]) -> Self {
        let mut chars = Vec::with_capacity(flat.len());
        let mut to_flat = Vec::with_capacity(flat.len());
        let mut in_whitespace = false;
        let mut started = false;

        for (fi, &ch) in flat.iter().enumerate() {
            if ch.is_whitespace() {
                if started {
                    in_whitespace = true;
                }
                continue;
            }
            if in_whitespace {
                // A collapsed run maps to its last whitespace character.
                chars.push(' ');
                to_flat.push(fi - 1);
                in_whitespace = false;
            }
            started = true;
            chars.push(ch);
            to_flat.push(fi);
        }

        Self { chars, to_flat }
    }

    fn find_from(&self, needle: &[char], cursor: usize) -> Option<usize> {
        if needle.is_empty() || cursor >= self.chars.len() {
            return None;
        }
        self.chars[cursor..]
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|pos| cursor + pos)
    }
}

fn normalize_sentence(sentence: &str) -> Vec<char> {
    let mut out = Vec::with_capacity(sentence.len());
    for (i, word) in sentence.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.extend(word.chars());
    }
    out
}

/// Recover a [`SourceRange`] for every sentence, in order.
///
/// The result always has one entry per sentence. Present ranges are
/// non-overlapping and strictly increasing in source order.
#[must_use]
pub fn align_sentences<S: AsRef<str>>(runs: &[TextRun], sentences: &[S]) -> Vec<Option<SourceRange>> {
    let flat = FlatText::build(runs);
    let normalized = NormalizedText::build(&flat.chars);

    let mut cursor = 0;
    let mut ranges = Vec::with_capacity(sentences.len());

    for (index, sentence) in sentences.iter().enumerate() {
        let needle = normalize_sentence(sentence.as_ref());
        let Some(match_start) = normalized.find_from(&needle, cursor) else {
            tracing::debug!(index, "Sentence not found in selection");
            ranges.push(None);
            continue;
        };
        let match_end = match_start + needle.len() - 1;
        cursor = match_end + 1;

        let range = map_match(runs, &flat, &normalized, match_start, match_end);
        if range.is_none() {
            tracing::debug!(index, "Sentence match could not be mapped to source runs");
        }
        ranges.push(range);
    }

    ranges
}

/// Steps 3–4 for one located match (inclusive normalized bounds).
fn map_match(
    runs: &[TextRun],
    flat: &FlatText,
    normalized: &NormalizedText,
    match_start: usize,
    match_end: usize,
) -> Option<SourceRange> {
    let flat_start = *normalized.to_flat.get(match_start)?;
    let flat_end = (*normalized.to_flat.get(match_end)?).min(flat.origin.len().checked_sub(1)?);
    if flat_start > flat_end {
        return None;
    }

    let window = &flat.origin[flat_start..=flat_end];
    let first = window.iter().find_map(|o| *o)?;
    let last = window.iter().rev().find_map(|o| *o)?;

    let end_run = runs.get(last.run)?;
    runs.get(first.run)?;

    Some(SourceRange {
        start: first,
        end: RunPosition {
            run: last.run,
            offset: (last.offset + 1).min(end_run.end_offset()),
        },
    })
}
