//! Local filesystem storage for uploaded files

use crate::error::DropError;
use crate::service::id::is_valid_id;
use crate::storage::config::StorageConfig;
use crate::storage::{file_id_from_name, StoredFile};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};

/// Upload directory addressed exclusively by allocated identifier.
pub struct LocalFileStore {
    upload_dir: PathBuf,
    /// Probe order when resolving an identifier to a file on disk
    extensions: Vec<String>,
}

impl LocalFileStore {
    /// Use the configured upload directory, creating it if needed.
    pub fn new(config: &StorageConfig) -> Result<Self, DropError> {
        let upload_dir = PathBuf::from(&config.upload_dir);
        if !upload_dir.exists() {
            std::fs::create_dir_all(&upload_dir)?;
        }
        info!("Using upload directory: {}", upload_dir.display());

        Ok(Self {
            upload_dir,
            extensions: config.allowed_extensions.iter().map(|e| e.to_lowercase()).collect(),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Storage path for an identifier and an optional validated extension.
    pub fn path_for(&self, file_id: &str, extension: Option<&str>) -> PathBuf {
        match extension {
            Some(ext) if !ext.is_empty() => self.upload_dir.join(format!("{}.{}", file_id, ext)),
            _ => self.upload_dir.join(file_id),
        }
    }

    /// Open a fresh file for exclusive writing. `None` means the path is
    /// already taken and the caller should draw another identifier.
    pub async fn create_exclusive(&self, path: &Path) -> Result<Option<File>, DropError> {
        match OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("Storage path already exists: {}", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an identifier to its file: each allow-listed extension is
    /// tried in order, then the bare identifier. First existing file wins.
    pub async fn locate(&self, file_id: &str) -> Option<PathBuf> {
        let candidates = self
            .extensions
            .iter()
            .map(|ext| self.path_for(file_id, Some(ext)))
            .chain(std::iter::once(self.path_for(file_id, None)));

        for candidate in candidates {
            if let Ok(meta) = fs::metadata(&candidate).await {
                if meta.is_file() {
                    return Some(candidate);
                }
            }
        }
        debug!("No stored file found for {}", file_id);
        None
    }

    /// Remove a file. Returns false if it was already gone.
    pub async fn remove(&self, path: &Path) -> Result<bool, DropError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), DropError> {
        fs::rename(from, to).await?;
        Ok(())
    }

    /// Whether a filename could have been produced by `path_for` for an
    /// allocated identifier: the id alone or the id plus an allow-listed
    /// extension.
    pub fn is_allocated_name(&self, name: &str) -> bool {
        match name.split_once('.') {
            None => is_valid_id(name),
            Some((id, ext)) => is_valid_id(id) && self.extensions.iter().any(|e| e == ext),
        }
    }

    /// Regular files in the upload directory named like stored uploads.
    /// Anything else (a database, editor droppings) is left alone.
    pub async fn list_files(&self) -> Result<Vec<StoredFile>, DropError> {
        let mut entries = fs::read_dir(&self.upload_dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !self.is_allocated_name(name) {
                debug!("Ignoring foreign file {} in upload directory", name);
                continue;
            }

            files.push(StoredFile {
                file_id: file_id_from_name(name).to_string(),
                path: entry.path(),
                modified: meta.modified()?,
            });
        }

        Ok(files)
    }
}
