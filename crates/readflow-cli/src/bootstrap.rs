//! Settings resolution for every command.
//!
//! Order: built-in defaults, then `READFLOW_*` environment variables, then
//! command-line flags. The merged result is validated once here so handlers
//! can trust it.

use readflow_core::{ReaderSettings, validate_settings};

use crate::error::CliError;

/// Values given on the command line. `None` keeps the environment's value.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub server_url: Option<String>,
    pub api_url: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub batch_size: Option<usize>,
    pub stall_timeout_ms: Option<u64>,
}

impl SettingsOverrides {
    fn apply(self, settings: &mut ReaderSettings) {
        if let Some(server_url) = self.server_url {
            settings.server_url = server_url;
        }
        if let Some(api_url) = self.api_url {
            settings.api_url = api_url;
        }
        if let Some(voice) = self.voice {
            settings.voice = voice;
        }
        if let Some(speed) = self.speed {
            settings.speed = speed;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(stall_timeout_ms) = self.stall_timeout_ms {
            settings.stall_timeout_ms = Some(stall_timeout_ms);
        }
    }
}

/// Resolve settings from the process environment and `overrides`.
pub fn load_settings(overrides: SettingsOverrides) -> Result<ReaderSettings, CliError> {
    load_settings_with(|key| std::env::var(key).ok(), overrides)
}

/// Same as [`load_settings`] with an explicit environment lookup.
pub fn load_settings_with<F>(
    lookup: F,
    overrides: SettingsOverrides,
) -> Result<ReaderSettings, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings =
        ReaderSettings::from_lookup(lookup).map_err(|e| CliError::Config(e.to_string()))?;
    overrides.apply(&mut settings);
    validate_settings(&settings).map_err(|e| CliError::Config(e.to_string()))?;
    tracing::debug!(?settings, "Resolved settings");
    Ok(settings)
}
