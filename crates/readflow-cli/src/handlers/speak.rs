//! Speak command handler.
//!
//! Wires a [`ReaderSession`] to the default audio device and the WebSocket
//! transport, prints sentences as they start and turns stdin lines into
//! session commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use readflow_core::ReaderSettings;
use readflow_voice::{
    ReaderSession, RodioOutput, SessionCommand, VoiceError, WsTransport, WsTransportConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CliError;
use crate::presentation::print_events;
use crate::utils::controls::{HELP, parse_control};
use crate::utils::input::read_text;

pub async fn execute(settings: &ReaderSettings, file: Option<&Path>) -> Result<()> {
    // Controls come from stdin, so the text cannot.
    if file.is_none_or(|p| p == Path::new("-")) {
        return Err(CliError::Config("speak needs a FILE; stdin is used for controls".into()).into());
    }
    let text = read_text(file)?;

    let (ended_tx, ended_rx) = mpsc::unbounded_channel();
    let output = RodioOutput::open(ended_tx).map_err(|e| CliError::Audio(e.to_string()))?;

    let (mut session, events) =
        ReaderSession::from_text(&text, settings, Box::new(output)).map_err(|e| match e {
            VoiceError::EmptyText => CliError::EmptyInput("no sentences found".into()),
            other => CliError::Audio(other.to_string()),
        })?;

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let transport = WsTransport::spawn(WsTransportConfig::from(settings), inbound_tx);
    session.attach_transport(Arc::new(transport));

    println!(
        "Reading {} sentences with {} at {}x",
        session.sentences().len(),
        settings.voice,
        settings.speed
    );
    println!("{HELP}");

    let printer = tokio::spawn(print_events(events, session.sentences().clone()));
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let controls = spawn_controls(commands_tx);

    session.run(inbound_rx, commands_rx, ended_rx).await;

    controls.abort();
    printer.await?;
    Ok(())
}

/// Forward stdin control lines and Ctrl-C to the session.
fn spawn_controls(commands_tx: mpsc::UnboundedSender<SessionCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match parse_control(&line) {
                        Some(command) => {
                            if commands_tx.send(command).is_err() {
                                return;
                            }
                        }
                        None => eprintln!("{HELP}"),
                    },
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read controls");
                        return;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    let _ = commands_tx.send(SessionCommand::Stop);
                    return;
                }
            }
        }
    })
}
