//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use std::sync::Arc;

use log::info;

use crate::config::AppConfig;
use crate::error::DropError;
use crate::metadata::mock_store::MockMetadataStore;
use crate::metadata::MetadataStorage;
use crate::service::deletion::DeletionService;
use crate::service::download::DownloadService;
use crate::service::expiration_worker::ExpirationWorker;
use crate::service::extension::ExtensionValidator;
use crate::service::upload::UploadService;
use crate::storage::local_store::LocalFileStore;

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataStorage>,
    pub files: Arc<LocalFileStore>,
    pub uploads: Arc<UploadService>,
    pub downloads: Arc<DownloadService>,
    pub deletions: Arc<DeletionService>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, DropError> {
        info!("Initializing application state with configuration");
        let metadata = config.metadata.create_store()?;
        Self::with_metadata(config, metadata)
    }

    /// Create application state with an in-memory metadata store; the upload
    /// directory still comes from `config`.
    pub fn new_for_testing(config: AppConfig) -> Result<Self, DropError> {
        Self::with_metadata(config, Arc::new(MockMetadataStore::new()))
    }

    fn with_metadata(config: AppConfig, metadata: Arc<dyn MetadataStorage>) -> Result<Self, DropError> {
        let files = Arc::new(LocalFileStore::new(&config.storage)?);

        let validator = ExtensionValidator::new(&config.storage.allowed_extensions);
        if !validator.is_enabled() {
            info!("Extension allow-list is empty, accepting any file type");
        }

        let uploads = Arc::new(UploadService::new(
            metadata.clone(),
            files.clone(),
            validator,
            config.storage.chunk_size,
            config.server.max_body_size,
            config.server.base_url.clone(),
        ));
        let downloads = Arc::new(DownloadService::new(metadata.clone(), files.clone(), config.storage.chunk_size));
        let deletions = Arc::new(DeletionService::new(metadata.clone(), files.clone()));

        info!("Application state initialized successfully");
        Ok(Self {
            metadata,
            files,
            uploads,
            downloads,
            deletions,
            config,
        })
    }

    /// Expiration worker sharing this state's stores.
    pub fn expiration_worker(&self) -> ExpirationWorker {
        ExpirationWorker::new(self.metadata.clone(), self.files.clone(), &self.config.expiration)
    }
}
