//! Root CLI structure with global options.

use clap::Parser;

use crate::commands::Commands;

/// Read text aloud through a streaming TTS server.
#[derive(Parser)]
#[command(name = "readflow")]
#[command(about = "Read text aloud with streaming synthesis and live highlighting")]
#[command(version)]
pub struct Cli {
    /// WebSocket URL of the synthesis server
    #[arg(long = "server", global = true)]
    pub server_url: Option<String>,

    /// HTTP base URL of the synthesis server
    #[arg(long = "api", global = true)]
    pub api_url: Option<String>,

    /// Log filter directive (overrides RUST_LOG)
    #[arg(long = "log", global = true, env = "READFLOW_LOG")]
    pub log_filter: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter for the tracing subscriber.
    #[must_use]
    pub fn log_directive(&self) -> String {
        match (&self.log_filter, self.verbose) {
            (Some(filter), _) => filter.clone(),
            (None, true) => "info,readflow=debug".to_owned(),
            (None, false) => "warn,readflow=info".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_args_after_subcommand() {
        let cli = Cli::parse_from([
            "readflow",
            "voices",
            "--api",
            "http://tts.local:7890",
            "--verbose",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.api_url.as_deref(), Some("http://tts.local:7890"));
        assert!(matches!(cli.command, Commands::Voices));
    }

    #[test]
    fn verbose_raises_log_level() {
        let cli = Cli::parse_from(["readflow", "-v", "health"]);
        assert_eq!(cli.log_directive(), "info,readflow=debug");
    }
}
