//! File type allow-list applied before any upload I/O.

use crate::error::DropError;
use crate::util::filename::split_extension;

/// Restricts accepted uploads to a fixed set of extensions.
#[derive(Debug, Clone)]
pub struct ExtensionValidator {
    allowed: Vec<String>,
}

impl ExtensionValidator {
    /// An empty list accepts every file type.
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// Extension the file will be stored under, `None` when validation is
    /// disabled. Fails with `Rejected` when the lowercased extension is not
    /// on the list.
    pub fn validate(&self, filename: &str) -> Result<Option<String>, DropError> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let (_, extension) = split_extension(filename);
        let extension = extension.to_lowercase();
        if extension.is_empty() || !self.allowed.contains(&extension) {
            return Err(DropError::Rejected(if extension.is_empty() {
                "missing extension".to_string()
            } else {
                format!(".{}", extension)
            }));
        }
        Ok(Some(extension))
    }
}
