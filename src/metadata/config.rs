//! Configuration for metadata storage backends

use crate::error::DropError;
use crate::metadata::{mock_store::MockMetadataStore, sqlite_store::SQLiteMetadataStore, MetadataStorage};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Available metadata storage backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    #[default]
    SQLite,
    Mock,
}

impl std::str::FromStr for MetadataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(MetadataBackend::SQLite),
            "mock" | "memory" => Ok(MetadataBackend::Mock),
            _ => Err(format!("Unknown metadata backend: {}", s)),
        }
    }
}

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Metadata backend type
    pub backend: MetadataBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::default(),
            db_path: "files.db".to_string(),
            wal_mode: true,
        }
    }
}

impl MetadataConfig {
    /// Create a metadata storage instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn MetadataStorage>, DropError> {
        match self.backend {
            MetadataBackend::SQLite => {
                info!("Using SQLite metadata backend with db_path: {}, wal_mode: {}", self.db_path, self.wal_mode);
                Ok(Arc::new(SQLiteMetadataStore::open(Path::new(&self.db_path), self.wal_mode)?))
            }
            MetadataBackend::Mock => {
                info!("Using mock metadata backend");
                Ok(Arc::new(MockMetadataStore::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_backend_from_str() {
        assert_eq!("sqlite".parse::<MetadataBackend>().unwrap(), MetadataBackend::SQLite);
        assert_eq!("SQLite".parse::<MetadataBackend>().unwrap(), MetadataBackend::SQLite);
        assert_eq!("mock".parse::<MetadataBackend>().unwrap(), MetadataBackend::Mock);
        assert_eq!("MEMORY".parse::<MetadataBackend>().unwrap(), MetadataBackend::Mock);

        assert!("invalid".parse::<MetadataBackend>().is_err());
    }

    #[test]
    fn test_metadata_config_default() {
        let config = MetadataConfig::default();
        assert_eq!(config.backend, MetadataBackend::SQLite);
        assert_eq!(config.db_path, "files.db");
    }

    #[test]
    fn test_create_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = MetadataConfig {
            backend: MetadataBackend::SQLite,
            db_path: dir.path().join("meta.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        let store = config.create_store().unwrap();
        assert!(store.list_all().unwrap().is_empty());

        let config = MetadataConfig { backend: MetadataBackend::Mock, ..MetadataConfig::default() };
        let store = config.create_store().unwrap();
        assert!(store.list_all().unwrap().is_empty());
    }
}
