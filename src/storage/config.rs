//! Configuration for the upload directory

use serde::{Deserialize, Serialize};

/// Default per-chunk read size: 50 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 50 * 1024 * 1024;

/// Extensions accepted when no allow-list is configured. Order matters: it is
/// the probe order used when resolving a stored file.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "txt", "log", "md", "csv", "json", "xml", "pdf", "png", "jpg", "jpeg", "gif", "webp", "svg",
    "mp3", "ogg", "wav", "mp4", "webm", "mkv", "zip", "tar", "gz", "bz2", "xz", "7z",
];

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding uploaded files
    pub upload_dir: String,
    /// Maximum bytes read from the request or file in one step
    pub chunk_size: usize,
    /// Lowercase extension allow-list; empty accepts any file type
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads/".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}
