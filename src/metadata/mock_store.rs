//! Mock implementation of MetadataStorage trait for testing

use crate::error::DropError;
use crate::metadata::{ExpiredRecord, ListedRecord, MetadataStorage, UploadRecord};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory implementation of MetadataStorage. Nothing survives a restart.
pub struct MockMetadataStore {
    records: Mutex<HashMap<String, UploadRecord>>,
}

impl MockMetadataStore {
    /// Create a new mock metadata store
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Clear all data from the store (useful for test cleanup)
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    /// Number of committed records
    pub fn record_count(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, UploadRecord>>, DropError> {
        self.records
            .lock()
            .map_err(|_| DropError::Storage("mock metadata lock poisoned".to_string()))
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStorage for MockMetadataStore {
    fn insert(&self, record: &UploadRecord) -> Result<(), DropError> {
        let mut records = self.records()?;

        let token_taken = record.delete_id.is_some()
            && records.values().any(|existing| existing.delete_id == record.delete_id);
        if records.contains_key(&record.file_id) || token_taken {
            return Err(DropError::DuplicateKey(record.file_id.clone()));
        }

        records.insert(record.file_id.clone(), record.clone());
        Ok(())
    }

    fn lookup(&self, file_id: &str) -> Result<UploadRecord, DropError> {
        self.records()?
            .get(file_id)
            .cloned()
            .ok_or_else(|| DropError::NotFound(file_id.to_string()))
    }

    fn lookup_by_delete_id(&self, delete_id: &str) -> Result<Option<UploadRecord>, DropError> {
        Ok(self
            .records()?
            .values()
            .find(|record| record.delete_id.as_deref() == Some(delete_id))
            .cloned())
    }

    fn list_all(&self) -> Result<Vec<ListedRecord>, DropError> {
        Ok(self
            .records()?
            .values()
            .map(|record| ListedRecord {
                file_id: record.file_id.clone(),
                original_name: record.original_name.clone(),
            })
            .collect())
    }

    fn delete(&self, file_id: &str) -> Result<(), DropError> {
        self.records()?.remove(file_id);
        Ok(())
    }

    fn list_expired(&self, now: f64, ttl: f64) -> Result<Vec<ExpiredRecord>, DropError> {
        Ok(self
            .records()?
            .values()
            .filter(|record| now - record.timestamp > ttl)
            .map(|record| ExpiredRecord {
                file_id: record.file_id.clone(),
                timestamp: record.timestamp,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_store_duplicate_delete_token() {
        let store = MockMetadataStore::new();
        let mut record = UploadRecord {
            file_id: "aaaa1111".to_string(),
            delete_id: Some("tok00001".to_string()),
            timestamp: 0.0,
            ip: "::1".to_string(),
            original_name: "a.txt".to_string(),
            extension: None,
            checksum: None,
        };
        store.insert(&record).unwrap();

        record.file_id = "bbbb2222".to_string();
        assert!(matches!(store.insert(&record), Err(DropError::DuplicateKey(_))));
        assert_eq!(store.record_count(), 1);

        store.clear();
        assert_eq!(store.record_count(), 0);
    }
}
