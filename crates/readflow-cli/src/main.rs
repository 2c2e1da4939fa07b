//! CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use readflow_cli::{Cli, CliError, Commands, SettingsOverrides, handlers, load_settings};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the text being read
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .filter(|_| cli.log_filter.is_none() && !cli.verbose)
        .unwrap_or_else(|| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            e.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
        }
    };
    // Exit explicitly: the stdin reader may still be parked on a blocking read.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut overrides = SettingsOverrides {
        server_url: cli.server_url,
        api_url: cli.api_url,
        ..Default::default()
    };

    match cli.command {
        Commands::Speak {
            file,
            voice,
            speed,
            batch_size,
            stall_timeout_ms,
        } => {
            overrides.voice = voice;
            overrides.speed = speed;
            overrides.batch_size = batch_size;
            overrides.stall_timeout_ms = stall_timeout_ms;
            let settings = load_settings(overrides)?;
            handlers::speak::execute(&settings, file.as_deref()).await?;
        }
        Commands::Segment { file, speed } => {
            overrides.speed = speed;
            let settings = load_settings(overrides)?;
            handlers::segment::execute(&settings, file.as_deref())?;
        }
        Commands::Voices => {
            let settings = load_settings(overrides)?;
            handlers::voices::execute(&settings).await?;
        }
        Commands::Health => {
            let settings = load_settings(overrides)?;
            handlers::health::execute(&settings).await?;
        }
    }
    Ok(())
}
