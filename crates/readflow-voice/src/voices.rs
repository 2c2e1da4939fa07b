//! HTTP client for the synthesis server's voice catalog and health check.

use std::time::Duration;

use async_trait::async_trait;
use readflow_core::{CatalogError, ReaderSettings, VoiceCatalogPort};
use serde::Deserialize;

pub use readflow_core::{VoiceCatalog, VoiceEntry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// [`VoiceCatalogPort`] over the server's REST endpoints.
pub struct CatalogClient {
    http: reqwest::Client,
    api_url: String,
}

impl CatalogClient {
    /// Client for the server at `api_url` (e.g. `http://127.0.0.1:7890`).
    pub fn new(api_url: impl Into<String>) -> Result<Self, CatalogError> {
        let api_url = api_url.into().trim_end_matches('/').to_owned();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Http {
                url: api_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { http, api_url })
    }

    pub fn from_settings(settings: &ReaderSettings) -> Result<Self, CatalogError> {
        Self::new(settings.api_url.as_str())
    }

    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get(&self, path: &str) -> Result<(String, reqwest::Response), CatalogError> {
        let url = format!("{}{path}", self.api_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok((url, response))
    }
}

#[async_trait]
impl VoiceCatalogPort for CatalogClient {
    async fn list_voices(&self) -> Result<VoiceCatalog, CatalogError> {
        let (url, response) = self.get("/voices").await?;
        let catalog: VoiceCatalog =
            response
                .json()
                .await
                .map_err(|e| CatalogError::InvalidResponse {
                    url,
                    message: e.to_string(),
                })?;
        tracing::debug!(voices = catalog.len(), "Fetched voice catalog");
        Ok(catalog)
    }

    async fn health(&self) -> Result<(), CatalogError> {
        let (url, response) = self.get("/health").await?;
        let health: HealthResponse =
            response
                .json()
                .await
                .map_err(|e| CatalogError::InvalidResponse {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
        if health.status == "ok" {
            Ok(())
        } else {
            Err(CatalogError::InvalidResponse {
                url,
                message: format!("server reported status {:?}", health.status),
            })
        }
    }
}
