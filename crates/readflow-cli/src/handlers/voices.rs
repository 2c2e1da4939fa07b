//! Voices command handler.
//!
//! Prints the server's catalog grouped by category, marking the configured
//! voice.

use anyhow::Result;
use readflow_core::{ReaderSettings, VoiceCatalogPort};
use readflow_voice::{CatalogClient, VoiceCatalog};

use crate::error::CliError;

pub async fn execute(settings: &ReaderSettings) -> Result<()> {
    let client =
        CatalogClient::from_settings(settings).map_err(|e| CliError::Service(e.to_string()))?;
    let catalog = client
        .list_voices()
        .await
        .map_err(|e| CliError::Service(e.to_string()))?;

    if catalog.is_empty() {
        println!("The server offers no voices.");
        return Ok(());
    }
    print!("{}", format_catalog(&catalog, &settings.voice));
    if catalog.find(&settings.voice).is_none() {
        println!("\nConfigured voice '{}' is not offered by this server.", settings.voice);
    }
    Ok(())
}

fn format_catalog(catalog: &VoiceCatalog, selected: &str) -> String {
    let mut out = String::new();
    for (group, voices) in &catalog.groups {
        out.push_str(group);
        out.push('\n');
        for voice in voices {
            let marker = if voice.id == selected { '*' } else { ' ' };
            out.push_str(&format!("  {marker} {:<14} {}\n", voice.id, voice.name));
        }
    }
    out
}
