//! CLI-specific error types and exit codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad flag or environment value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file could not be read.
    #[error("IO error: {0}")]
    Io(String),

    /// The input held nothing to read.
    #[error("Nothing to read: {0}")]
    EmptyInput(String),

    /// The synthesis server could not be reached or answered badly.
    #[error("TTS server error: {0}")]
    Service(String),

    /// The audio device could not be opened.
    #[error("Audio error: {0}")]
    Audio(String),
}

impl CliError {
    /// Map error to a sysexits-style exit code.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,     // EX_CONFIG
            Self::Io(_) => 74,         // EX_IOERR
            Self::EmptyInput(_) => 65, // EX_DATAERR
            Self::Service(_) => 69,    // EX_UNAVAILABLE
            Self::Audio(_) => 71,      // EX_OSERR
        }
    }
}
