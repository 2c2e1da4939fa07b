//! Sentence segmentation.
//!
//! Splits selected text into the ordered sentence list that drives both the
//! synthesis requests and the highlight alignment. Abbreviation periods
//! ("Dr.", "e.g.") are protected with a sentinel before splitting so they never
//! end a sentence.

use std::sync::{Arc, LazyLock};

use regex::Regex;

/// Stand-in for a protected abbreviation period while splitting.
const SENTINEL: char = '\u{0}';

/// Abbreviations whose trailing period is not a sentence boundary.
static ABBREVIATIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:Mr|Mrs|Ms|Dr|Prof|Sr|Jr|St|vs|etc|Inc|Ltd|Corp|approx|dept|est|govt|i\.e|e\.g)\.",
    )
    .expect("abbreviation pattern is valid")
});

/// Terminal punctuation followed by whitespace.
static BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("boundary pattern is valid"));

/// Split `text` into trimmed, non-empty sentences.
///
/// Never fails: empty or whitespace-only input yields an empty list, text with
/// no terminal punctuation yields a single sentence.
#[must_use]
pub fn segment(text: &str) -> Vec<String> {
    let protected = ABBREVIATIONS.replace_all(text, |caps: &regex::Captures<'_>| {
        caps[0].replace('.', &SENTINEL.to_string())
    });

    let mut sentences = Vec::new();
    let mut last = 0;
    for boundary in BOUNDARY.find_iter(&protected) {
        // Punctuation is a single ASCII byte, keep it with the sentence.
        push_restored(&mut sentences, &protected[last..=boundary.start()]);
        last = boundary.end();
    }
    push_restored(&mut sentences, &protected[last..]);

    sentences
}

fn push_restored(sentences: &mut Vec<String>, piece: &str) {
    let restored = piece.replace(SENTINEL, ".");
    let trimmed = restored.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Number of whitespace-delimited tokens.
#[must_use]
pub fn word_count(sentence: &str) -> usize {
    sentence.split_whitespace().count()
}

/// One segmented sentence with its ordinal position in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub index: usize,
    pub text: String,
    pub words: usize,
}

/// The immutable, cheaply clonable sentence list of a reading session.
#[derive(Debug, Clone, Default)]
pub struct SentenceList {
    sentences: Arc<[Sentence]>,
}

impl SentenceList {
    /// Segment `text` and index the result.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::from_sentences(segment(text))
    }

    /// Build a list from already segmented sentences.
    #[must_use]
    pub fn from_sentences<I, S>(sentences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sentences: Vec<Sentence> = sentences
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let text = text.into();
                let words = word_count(&text);
                Sentence { index, text, words }
            })
            .collect();
        Self {
            sentences: sentences.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    /// Sentence texts for the half-open index range, clamped to the list.
    #[must_use]
    pub fn texts(&self, from: usize, to: usize) -> Vec<String> {
        let to = to.min(self.len());
        if from >= to {
            return Vec::new();
        }
        self.sentences[from..to]
            .iter()
            .map(|s| s.text.clone())
            .collect()
    }

    /// Total word count of the half-open index range, clamped to the list.
    #[must_use]
    pub fn words_in(&self, from: usize, to: usize) -> usize {
        let to = to.min(self.len());
        if from >= to {
            return 0;
        }
        self.sentences[from..to].iter().map(|s| s.words).sum()
    }

    #[must_use]
    pub fn total_words(&self) -> usize {
        self.words_in(0, self.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sentence> {
        self.sentences.iter()
    }

    /// Plain sentence strings, in order.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.texts(0, self.len())
    }
}
