//! Metadata Storage Layer Abstraction
//!
//! Durable mapping from public file identifier to the upload record. The
//! rest of the service only talks to it through the `MetadataStorage` trait,
//! so the SQLite backend can be swapped for the in-memory one in tests.

pub mod sqlite_store;
pub mod mock_store;
pub mod config;


use serde::{Deserialize, Serialize};

use crate::error::DropError;

/// One row per stored file. Immutable once committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadRecord {
    /// Short public identifier, primary lookup key
    pub file_id: String,
    /// Secret token authorizing deletion
    pub delete_id: Option<String>,
    /// Seconds since the epoch at upload completion
    pub timestamp: f64,
    /// Originating client address, informational only
    pub ip: String,
    /// Sanitized client filename, only used for Content-Disposition
    pub original_name: String,
    /// Validated, lowercased extension the file is stored under
    pub extension: Option<String>,
    /// Hex MD5 digest of the stored bytes
    pub checksum: Option<String>,
}

/// Entry of the public listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedRecord {
    pub file_id: String,
    pub original_name: String,
}

/// Record that has outlived the configured TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredRecord {
    pub file_id: String,
    pub timestamp: f64,
}

/// Trait defining the metadata storage interface.
///
/// Every mutating call is committed before it returns.
pub trait MetadataStorage: Send + Sync {
    /// Persist a new record. Fails with `DuplicateKey` if `file_id` or
    /// `delete_id` is already taken, leaving the store unchanged.
    fn insert(&self, record: &UploadRecord) -> Result<(), DropError>;

    /// Fetch a record, `NotFound` if absent.
    fn lookup(&self, file_id: &str) -> Result<UploadRecord, DropError>;

    /// Fetch the record a deletion token belongs to.
    fn lookup_by_delete_id(&self, delete_id: &str) -> Result<Option<UploadRecord>, DropError>;

    /// Every record, in no particular order.
    fn list_all(&self) -> Result<Vec<ListedRecord>, DropError>;

    /// Remove a record. Absent ids are not an error.
    fn delete(&self, file_id: &str) -> Result<(), DropError>;

    /// Records for which `now - timestamp > ttl`.
    fn list_expired(&self, now: f64, ttl: f64) -> Result<Vec<ExpiredRecord>, DropError>;
}

/// Current time as floating-point seconds since the epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_is_recent() {
        let now = now_timestamp();
        // 2020-01-01
        assert!(now > 1_577_836_800.0);
        assert!(now_timestamp() >= now);
    }
}
