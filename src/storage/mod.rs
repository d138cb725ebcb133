//! Binary Storage Layer
//!
//! Uploaded files live in a single directory, one file per upload, named
//! after the allocated identifier plus the validated extension. Paths are
//! never derived from client-supplied names.

pub mod local_store;
pub mod config;

use std::path::PathBuf;
use std::time::SystemTime;

/// A file found in the upload directory.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Identifier part of the filename (everything before the first `.`)
    pub file_id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Identifier a stored filename belongs to.
pub fn file_id_from_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_from_name() {
        assert_eq!(file_id_from_name("abcd1234.txt"), "abcd1234");
        assert_eq!(file_id_from_name("abcd1234"), "abcd1234");
        assert_eq!(file_id_from_name("abcd1234.tar.gz"), "abcd1234");
    }
}
