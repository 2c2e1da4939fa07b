//! Reader settings and validation.
//!
//! Pure configuration types: defaults, an environment overlay and range
//! checks. Loading `.env` files and command-line overrides happen in the
//! binary.

use serde::{Deserialize, Serialize};

use crate::text::DEFAULT_WORDS_PER_MINUTE;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:7890/ws";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:7890";
pub const DEFAULT_VOICE: &str = "af_sarah";
pub const DEFAULT_SPEED: f32 = 1.5;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_PREFETCH_LEAD: usize = 2;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;
/// Increment used by the speed up / speed down commands.
pub const SPEED_STEP: f32 = 0.25;

/// Prefix of the environment variables read by [`ReaderSettings::from_env`].
pub const ENV_PREFIX: &str = "READFLOW_";

/// Settings of a reading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// WebSocket endpoint of the synthesis service.
    pub server_url: String,

    /// HTTP base URL of the synthesis service (voices, health).
    pub api_url: String,

    /// Voice id sent with every batch.
    pub voice: String,

    /// Playback speed multiplier.
    pub speed: f32,

    /// Sentences per synthesis request.
    pub batch_size: usize,

    /// Request the next batch when playback is this close to the fetch frontier.
    pub prefetch_lead: usize,

    /// Speaking rate used for time estimates before audio arrives.
    pub words_per_minute: u32,

    /// Delay before reconnecting after an unexpected disconnect.
    pub reconnect_delay_ms: u64,

    /// Report a stall after waiting this long for the current sentence's audio.
    pub stall_timeout_ms: Option<u64>,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            speed: DEFAULT_SPEED,
            batch_size: DEFAULT_BATCH_SIZE,
            prefetch_lead: DEFAULT_PREFETCH_LEAD,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            stall_timeout_ms: None,
        }
    }
}

impl ReaderSettings {
    /// Defaults overlaid with `READFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by full variable name
    /// (`READFLOW_SPEED`, `READFLOW_VOICE`, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        let mut settings = Self::default();
        if let Some((_, value)) = get("SERVER_URL") {
            settings.server_url = value;
        }
        if let Some((_, value)) = get("API_URL") {
            settings.api_url = value;
        }
        if let Some((_, value)) = get("VOICE") {
            settings.voice = value;
        }
        if let Some((key, value)) = get("SPEED") {
            settings.speed = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("BATCH_SIZE") {
            settings.batch_size = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("PREFETCH_LEAD") {
            settings.prefetch_lead = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("WORDS_PER_MINUTE") {
            settings.words_per_minute = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("RECONNECT_DELAY_MS") {
            settings.reconnect_delay_ms = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("STALL_TIMEOUT_MS") {
            settings.stall_timeout_ms = Some(parse(&key, &value)?);
        }
        Ok(settings)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Clamp a playback speed into the supported range.
///
/// Non-finite input falls back to normal speed.
#[must_use]
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SettingsError {
    #[error("Speed must be between {MIN_SPEED} and {MAX_SPEED}, got {0}")]
    InvalidSpeed(f32),

    #[error("Batch size must be between 1 and 50, got {0}")]
    InvalidBatchSize(usize),

    #[error("Words per minute must be greater than zero")]
    InvalidWordsPerMinute,

    #[error("Server URL must start with ws:// or wss://, got {0}")]
    InvalidServerUrl(String),

    #[error("API URL must start with http:// or https://, got {0}")]
    InvalidApiUrl(String),

    #[error("Voice cannot be empty")]
    EmptyVoice,

    #[error("Stall timeout must be greater than zero")]
    InvalidStallTimeout,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &ReaderSettings) -> Result<(), SettingsError> {
    if !(MIN_SPEED..=MAX_SPEED).contains(&settings.speed) {
        return Err(SettingsError::InvalidSpeed(settings.speed));
    }

    if !(1..=50).contains(&settings.batch_size) {
        return Err(SettingsError::InvalidBatchSize(settings.batch_size));
    }

    if settings.words_per_minute == 0 {
        return Err(SettingsError::InvalidWordsPerMinute);
    }

    if !(settings.server_url.starts_with("ws://") || settings.server_url.starts_with("wss://")) {
        return Err(SettingsError::InvalidServerUrl(settings.server_url.clone()));
    }

    if !(settings.api_url.starts_with("http://") || settings.api_url.starts_with("https://")) {
        return Err(SettingsError::InvalidApiUrl(settings.api_url.clone()));
    }

    if settings.voice.trim().is_empty() {
        return Err(SettingsError::EmptyVoice);
    }

    if settings.stall_timeout_ms == Some(0) {
        return Err(SettingsError::InvalidStallTimeout);
    }

    Ok(())
}
