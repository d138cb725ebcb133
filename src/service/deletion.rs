//! Removal of a stored file by its deletion token.

use std::sync::Arc;

use log::{info, warn};

use crate::error::DropError;
use crate::metadata::{MetadataStorage, UploadRecord};
use crate::storage::local_store::LocalFileStore;

pub struct DeletionService {
    metadata: Arc<dyn MetadataStorage>,
    files: Arc<LocalFileStore>,
}

impl DeletionService {
    pub fn new(metadata: Arc<dyn MetadataStorage>, files: Arc<LocalFileStore>) -> Self {
        Self { metadata, files }
    }

    /// Delete the upload owning `delete_id`, file first, then row. Returns
    /// the removed record, or `None` when the token matches nothing (already
    /// deleted or never issued).
    pub async fn delete_by_token(&self, delete_id: &str) -> Result<Option<UploadRecord>, DropError> {
        let Some(record) = self.metadata.lookup_by_delete_id(delete_id)? else {
            info!("Deletion token matched no record");
            return Ok(None);
        };

        remove_upload(self.metadata.as_ref(), &self.files, &record.file_id).await?;
        info!("Deleted {} on owner request", record.file_id);
        Ok(Some(record))
    }
}

/// Remove the file behind `file_id` and then its row. A missing file is
/// treated as already removed.
pub async fn remove_upload(
    metadata: &dyn MetadataStorage,
    files: &LocalFileStore,
    file_id: &str,
) -> Result<(), DropError> {
    match files.locate(file_id).await {
        Some(path) => {
            files.remove(&path).await?;
        }
        None => warn!("No file on disk for {}, removing record only", file_id),
    }
    metadata.delete(file_id)
}
