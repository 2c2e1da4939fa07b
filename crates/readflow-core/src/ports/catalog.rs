//! Voice catalog and health port for the synthesis service's HTTP side.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A selectable voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Identifier sent in synthesis requests (e.g. `"af_sarah"`).
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Voices grouped by language/accent category, as served by `GET /voices`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceCatalog {
    pub groups: BTreeMap<String, Vec<VoiceEntry>>,
}

impl VoiceCatalog {
    /// Look up a voice by id across all groups.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&VoiceEntry> {
        self.groups.values().flatten().find(|voice| voice.id == id)
    }

    /// Number of voices across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Service returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

/// Read-only queries against the synthesis service.
#[async_trait]
pub trait VoiceCatalogPort: Send + Sync {
    /// Fetch the grouped voice list.
    async fn list_voices(&self) -> Result<VoiceCatalog, CatalogError>;

    /// Check that the service is up.
    async fn health(&self) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_parses_grouped_voices() {
        let json = r#"{
            "American Female": [{"id": "af_heart", "name": "Heart"}, {"id": "af_sarah", "name": "Sarah"}],
            "British Male": [{"id": "bm_george", "name": "George"}]
        }"#;
        let catalog: VoiceCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.find("bm_george").map(|v| v.name.as_str()), Some("George"));
        assert!(catalog.find("zz_none").is_none());
    }

    struct StaticCatalog(VoiceCatalog);

    #[async_trait]
    impl VoiceCatalogPort for StaticCatalog {
        async fn list_voices(&self) -> Result<VoiceCatalog, CatalogError> {
            Ok(self.0.clone())
        }

        async fn health(&self) -> Result<(), CatalogError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn port_is_object_safe() {
        let port: Box<dyn VoiceCatalogPort> = Box::new(StaticCatalog(VoiceCatalog::default()));
        assert!(port.list_voices().await.unwrap().is_empty());
        assert!(port.health().await.is_ok());
    }
}
