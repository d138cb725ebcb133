//! SQLite implementation of MetadataStorage trait

use crate::error::DropError;
use crate::metadata::{ExpiredRecord, ListedRecord, MetadataStorage, UploadRecord};
use log::{debug, info, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id TEXT NOT NULL UNIQUE,
    delete_id TEXT UNIQUE,
    timestamp REAL NOT NULL,
    ip TEXT NOT NULL,
    originalname TEXT NOT NULL,
    extension TEXT,
    checksum TEXT
)";

const RECORD_COLUMNS: &str = "file_id, delete_id, timestamp, ip, originalname, extension, checksum";

/// SQLite implementation of MetadataStorage
pub struct SQLiteMetadataStore {
    conn: Mutex<Connection>,
}

impl SQLiteMetadataStore {
    /// Open (creating if needed) the database file and its table
    pub fn open(db_path: &Path, wal_mode: bool) -> Result<Self, DropError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening metadata database at {}", db_path.display());
        let conn = Connection::open(db_path)?;
        if wal_mode {
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DropError> {
        self.conn
            .lock()
            .map_err(|_| DropError::Storage("metadata connection lock poisoned".to_string()))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<UploadRecord> {
    Ok(UploadRecord {
        file_id: row.get(0)?,
        delete_id: row.get(1)?,
        timestamp: row.get(2)?,
        ip: row.get(3)?,
        original_name: row.get(4)?,
        extension: row.get(5)?,
        checksum: row.get(6)?,
    })
}

impl MetadataStorage for SQLiteMetadataStore {
    fn insert(&self, record: &UploadRecord) -> Result<(), DropError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO files (file_id, delete_id, timestamp, ip, originalname, extension, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.file_id,
                record.delete_id,
                record.timestamp,
                record.ip,
                record.original_name,
                record.extension,
                record.checksum,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                warn!("Identifier collision on insert for {}", record.file_id);
                Err(DropError::DuplicateKey(record.file_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lookup(&self, file_id: &str) -> Result<UploadRecord, DropError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM files WHERE file_id = ?1", RECORD_COLUMNS);
        conn.query_row(&sql, params![file_id], record_from_row)
            .optional()?
            .ok_or_else(|| DropError::NotFound(file_id.to_string()))
    }

    fn lookup_by_delete_id(&self, delete_id: &str) -> Result<Option<UploadRecord>, DropError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM files WHERE delete_id = ?1", RECORD_COLUMNS);
        Ok(conn.query_row(&sql, params![delete_id], record_from_row).optional()?)
    }

    fn list_all(&self) -> Result<Vec<ListedRecord>, DropError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT file_id, originalname FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok(ListedRecord {
                file_id: row.get(0)?,
                original_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete(&self, file_id: &str) -> Result<(), DropError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM files WHERE file_id = ?1", params![file_id])?;
        Ok(())
    }

    fn list_expired(&self, now: f64, ttl: f64) -> Result<Vec<ExpiredRecord>, DropError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT file_id, timestamp FROM files WHERE ?1 - timestamp > ?2")?;
        let rows = stmt.query_map(params![now, ttl], |row| {
            Ok(ExpiredRecord {
                file_id: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
