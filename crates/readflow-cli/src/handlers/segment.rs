//! Segment command handler.
//!
//! Shows exactly which sentences `speak` would send, with word counts and a
//! pacing estimate.

use std::path::Path;

use anyhow::Result;
use readflow_core::{Pacing, ReaderSettings, SentenceList};

use crate::error::CliError;
use crate::presentation::format_duration;
use crate::utils::input::read_text;

pub fn execute(settings: &ReaderSettings, file: Option<&Path>) -> Result<()> {
    let text = read_text(file)?;
    let sentences = SentenceList::from_text(&text);
    if sentences.is_empty() {
        return Err(CliError::EmptyInput("no sentences found".into()).into());
    }
    print!("{}", format_sentences(&sentences, settings));
    Ok(())
}

fn format_sentences(sentences: &SentenceList, settings: &ReaderSettings) -> String {
    let pacing = Pacing::new(settings.words_per_minute);
    let mut out = String::new();
    for sentence in sentences.iter() {
        out.push_str(&format!(
            "{:>4}  {:>3}w  {}\n",
            sentence.index + 1,
            sentence.words,
            sentence.text
        ));
    }
    let total = pacing.estimate_remaining(sentences, 0, settings.speed);
    out.push_str(&format!(
        "\n{} sentences, {} words, about {} at {}x\n",
        sentences.len(),
        sentences.total_words(),
        format_duration(total),
        settings.speed
    ));
    out
}
