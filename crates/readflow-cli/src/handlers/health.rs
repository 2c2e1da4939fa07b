//! Health command handler.

use anyhow::Result;
use readflow_core::{ReaderSettings, VoiceCatalogPort};
use readflow_voice::CatalogClient;

use crate::error::CliError;

pub async fn execute(settings: &ReaderSettings) -> Result<()> {
    let client =
        CatalogClient::from_settings(settings).map_err(|e| CliError::Service(e.to_string()))?;
    client
        .health()
        .await
        .map_err(|e| CliError::Service(e.to_string()))?;
    println!("TTS server at {} is healthy.", client.api_url());
    Ok(())
}
