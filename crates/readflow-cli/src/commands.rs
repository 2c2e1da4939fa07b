//! Available subcommands.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Read a file (or stdin) aloud
    Speak {
        /// Text file to read; `-` or nothing reads stdin
        file: Option<PathBuf>,
        /// Voice id (see `readflow voices`)
        #[arg(long)]
        voice: Option<String>,
        /// Playback speed, 0.5 to 2.0
        #[arg(short, long)]
        speed: Option<f32>,
        /// Sentences per synthesis request
        #[arg(long)]
        batch_size: Option<usize>,
        /// Report when audio has not arrived after this many milliseconds
        #[arg(long)]
        stall_timeout_ms: Option<u64>,
    },

    /// Print the sentences that would be read
    Segment {
        /// Text file to segment; `-` or nothing reads stdin
        file: Option<PathBuf>,
        /// Speed used for the time estimate
        #[arg(short, long)]
        speed: Option<f32>,
    },

    /// List the voices offered by the server
    Voices,

    /// Check that the server is reachable
    Health,
}
