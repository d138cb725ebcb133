//! Chunked upload ingestion.
//!
//! A request body is pulled from the transport in bounded chunks and
//! appended to a freshly created file named after the allocated identifier.
//! The metadata row is inserted only once the whole body is on disk, so a
//! dropped connection leaves at most an orphaned file that no reader can
//! reach.

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::error::PayloadError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DropError;
use crate::metadata::{now_timestamp, MetadataStorage, UploadRecord};
use crate::service::extension::ExtensionValidator;
use crate::service::id::new_id;
use crate::storage::local_store::LocalFileStore;
use crate::util::filename::sanitize_filename;

/// Attempts at finding a free identifier before giving up.
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Reads a transport byte stream in chunks of at most `max_chunk` bytes.
///
/// Each call to `next_chunk` suspends until `min(max_chunk, remaining)` bytes
/// have arrived, where `remaining` is what is left of the declared length.
/// Frames larger than that are split and the rest kept for the next call.
pub struct BoundedChunks<S> {
    inner: S,
    pending: Bytes,
    declared: Option<u64>,
    remaining: Option<u64>,
    received: u64,
    max_chunk: usize,
    finished: bool,
}

impl<S> BoundedChunks<S>
where
    S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
{
    pub fn new(inner: S, declared: Option<u64>, max_chunk: usize) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            declared,
            remaining: declared,
            received: 0,
            max_chunk: max_chunk.max(1),
            finished: false,
        }
    }

    /// Bytes handed out so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Next chunk, or `None` once the declared length has been read (or the
    /// stream ended, when no length was declared). A stream that ends short
    /// of the declared length fails with `IncompleteBody`.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, DropError> {
        let target = match self.remaining {
            Some(remaining) => remaining.min(self.max_chunk as u64) as usize,
            None => self.max_chunk,
        };
        if target == 0 {
            return Ok(None);
        }

        let mut buf = BytesMut::new();
        while buf.len() < target {
            if self.pending.is_empty() {
                if self.finished {
                    break;
                }
                match self.inner.next().await {
                    Some(Ok(frame)) => self.pending = frame,
                    Some(Err(e)) => return Err(DropError::Payload(e.to_string())),
                    None => self.finished = true,
                }
                continue;
            }
            let take = (target - buf.len()).min(self.pending.len());
            buf.extend_from_slice(&self.pending.split_to(take));
        }

        self.received += buf.len() as u64;
        if let Some(remaining) = self.remaining.as_mut() {
            if buf.len() < target {
                return Err(DropError::IncompleteBody {
                    expected: self.declared.unwrap_or_default(),
                    received: self.received,
                });
            }
            *remaining -= buf.len() as u64;
        }

        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.freeze()))
        }
    }
}

/// What the transport tells us about an incoming upload.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    /// Client-declared filename, unsanitized
    pub filename: &'a str,
    pub remote_addr: String,
    /// Declared Content-Length, if any
    pub content_length: Option<u64>,
}

/// Outcome of a committed upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub record: UploadRecord,
    pub bytes_received: u64,
    pub url: String,
    pub delete_url: String,
}

impl UploadReceipt {
    /// Plain-text body returned to the uploader.
    pub fn message(&self) -> String {
        format!(
            "Received {} bytes (md5 {})\n{}\nDelete with: curl -X DELETE {}\n",
            self.bytes_received,
            self.record.checksum.as_deref().unwrap_or("-"),
            self.url,
            self.delete_url,
        )
    }
}

/// Drives a single request body into storage and commits its record.
pub struct UploadService {
    metadata: Arc<dyn MetadataStorage>,
    files: Arc<LocalFileStore>,
    validator: ExtensionValidator,
    chunk_size: usize,
    max_body_size: u64,
    base_url: String,
}

impl UploadService {
    pub fn new(
        metadata: Arc<dyn MetadataStorage>,
        files: Arc<LocalFileStore>,
        validator: ExtensionValidator,
        chunk_size: usize,
        max_body_size: u64,
        base_url: String,
    ) -> Self {
        Self {
            metadata,
            files,
            validator,
            chunk_size,
            max_body_size,
            base_url,
        }
    }

    /// Checks that need only the request line and headers: a usable
    /// filename, an allowed extension and a declared size within the limit.
    /// Runs before any body byte is read, including while the client waits
    /// on `Expect: 100-continue`. Returns the sanitized name and the
    /// extension to store under.
    pub fn admit(&self, filename: &str, content_length: Option<u64>) -> Result<(String, Option<String>), DropError> {
        let original_name = sanitize_filename(filename);
        if original_name.is_empty() {
            return Err(DropError::InvalidFilename(filename.to_string()));
        }
        let extension = self.validator.validate(&original_name)?;
        if let Some(declared) = content_length {
            if declared > self.max_body_size {
                warn!("Rejecting {} byte upload of {}", declared, original_name);
                return Err(DropError::PayloadTooLarge { limit: self.max_body_size });
            }
        }
        Ok((original_name, extension))
    }

    pub async fn ingest<S>(&self, request: UploadRequest<'_>, body: S) -> Result<UploadReceipt, DropError>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    {
        let (original_name, extension) = self.admit(request.filename, request.content_length)?;

        let (file_id, path, file) = self.allocate(extension.as_deref()).await?;
        log_mdc::insert("file_id", &file_id);
        info!("Receiving {} from {} as {}", original_name, request.remote_addr, file_id);

        let (bytes_received, checksum) = match self.stream_to_file(file, body, request.content_length).await {
            Ok(done) => done,
            Err(e) => {
                warn!("Upload {} aborted: {}", file_id, e);
                self.discard(&path).await;
                log_mdc::remove("file_id");
                return Err(e);
            }
        };

        let record = UploadRecord {
            file_id,
            delete_id: Some(new_id()),
            timestamp: now_timestamp(),
            ip: request.remote_addr,
            original_name,
            extension,
            checksum: Some(checksum),
        };
        let record = self.commit(record, path).await;
        log_mdc::remove("file_id");
        let record = record?;

        let delete_url = format!("{}delete/{}", self.base_url, record.delete_id.as_deref().unwrap_or_default());
        Ok(UploadReceipt {
            url: format!("{}{}", self.base_url, record.file_id),
            delete_url,
            bytes_received,
            record,
        })
    }

    /// Draw identifiers until one maps to a path nobody holds yet.
    async fn allocate(&self, extension: Option<&str>) -> Result<(String, PathBuf, File), DropError> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let file_id = new_id();
            let path = self.files.path_for(&file_id, extension);
            if let Some(file) = self.files.create_exclusive(&path).await? {
                return Ok((file_id, path, file));
            }
        }
        Err(DropError::Storage("no free identifier after repeated collisions".to_string()))
    }

    async fn stream_to_file<S>(&self, mut file: File, body: S, declared: Option<u64>) -> Result<(u64, String), DropError>
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + Unpin,
    {
        let mut chunks = BoundedChunks::new(body, declared, self.chunk_size);
        let mut digest = md5::Context::new();

        while let Some(chunk) = chunks.next_chunk().await? {
            if chunks.received() > self.max_body_size {
                return Err(DropError::PayloadTooLarge { limit: self.max_body_size });
            }
            debug!("Received {} bytes", chunk.len());
            file.write_all(&chunk).await?;
            digest.consume(&chunk);
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok((chunks.received(), format!("{:x}", digest.compute())))
    }

    /// Insert the record. A duplicate key moves the finished file to a freshly
    /// drawn identifier and tries again.
    async fn commit(&self, mut record: UploadRecord, mut path: PathBuf) -> Result<UploadRecord, DropError> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            match self.metadata.insert(&record) {
                Ok(()) => {
                    info!("Stored {} as {}", record.original_name, record.file_id);
                    return Ok(record);
                }
                Err(DropError::DuplicateKey(key)) if attempt < MAX_ALLOCATION_ATTEMPTS => {
                    warn!("Identifier collision on {}, reallocating", key);
                    let (file_id, new_path, placeholder) = match self.allocate(record.extension.as_deref()).await {
                        Ok(allocated) => allocated,
                        Err(e) => {
                            self.discard(&path).await;
                            return Err(e);
                        }
                    };
                    drop(placeholder);
                    if let Err(e) = self.files.rename(&path, &new_path).await {
                        self.discard(&path).await;
                        self.discard(&new_path).await;
                        return Err(e);
                    }
                    record.file_id = file_id;
                    record.delete_id = Some(new_id());
                    path = new_path;
                }
                Err(e) => {
                    error!("Failed to commit record for {}: {}", record.file_id, e);
                    self.discard(&path).await;
                    return Err(e);
                }
            }
        }
        self.discard(&path).await;
        Err(DropError::Storage("no free identifier after repeated collisions".to_string()))
    }

    async fn discard(&self, path: &std::path::Path) {
        if let Err(e) = self.files.remove(path).await {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::storage::config::StorageConfig;
    use futures::stream;

    type Frames = stream::Iter<std::vec::IntoIter<Result<Bytes, PayloadError>>>;

    fn frames(parts: &[&[u8]]) -> Frames {
        let items: Vec<Result<Bytes, PayloadError>> =
            parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect();
        stream::iter(items)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        metadata: Arc<MockMetadataStore>,
        files: Arc<LocalFileStore>,
        service: UploadService,
    }

    fn fixture(chunk_size: usize, max_body_size: u64, extensions: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            upload_dir: dir.path().join("uploads").to_string_lossy().into_owned(),
            chunk_size,
            allowed_extensions: extensions.iter().map(|e| e.to_string()).collect(),
        };
        let metadata = Arc::new(MockMetadataStore::new());
        let files = Arc::new(LocalFileStore::new(&storage).unwrap());
        let service = UploadService::new(
            metadata.clone(),
            files.clone(),
            ExtensionValidator::new(&storage.allowed_extensions),
            chunk_size,
            max_body_size,
            "http://drop.test/".to_string(),
        );
        Fixture { _dir: dir, metadata, files, service }
    }

    fn request(filename: &str, content_length: Option<u64>) -> UploadRequest<'_> {
        UploadRequest {
            filename,
            remote_addr: "127.0.0.1".to_string(),
            content_length,
        }
    }

    #[tokio::test]
    async fn test_bounded_chunks_respect_max_and_remaining() {
        let mut chunks = BoundedChunks::new(frames(&[b"Hello, ", b"world!!!!!"]), Some(17), 5);
        let mut sizes = Vec::new();
        let mut all = Vec::new();
        while let Some(chunk) = chunks.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
            all.extend_from_slice(&chunk);
        }
        assert_eq!(sizes, vec![5, 5, 5, 2]);
        assert_eq!(all, b"Hello, world!!!!!");
        assert_eq!(chunks.received(), 17);
    }

    #[tokio::test]
    async fn test_bounded_chunks_without_declared_length() {
        let mut chunks = BoundedChunks::new(frames(&[b"abc", b"", b"defg"]), None, 4);
        assert_eq!(chunks.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(chunks.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"efg"));
        assert!(chunks.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bounded_chunks_short_body_is_incomplete() {
        let mut chunks = BoundedChunks::new(frames(&[b"abc"]), Some(10), 64);
        let err = chunks.next_chunk().await.unwrap_err();
        assert!(matches!(err, DropError::IncompleteBody { expected: 10, received: 3 }));
    }

    #[tokio::test]
    async fn test_ingest_commits_record_after_full_body() {
        let fx = fixture(4, 1024, &["txt"]);
        let receipt = fx
            .service
            .ingest(request("report.txt", Some(17)), frames(&[b"Hello, world", b"!!!!!"]))
            .await
            .unwrap();

        assert_eq!(receipt.bytes_received, 17);
        assert_eq!(receipt.record.file_id.len(), 8);
        assert_eq!(receipt.url, format!("http://drop.test/{}", receipt.record.file_id));
        assert_eq!(receipt.record.extension.as_deref(), Some("txt"));
        assert_ne!(receipt.record.delete_id.as_deref(), Some(receipt.record.file_id.as_str()));
        assert_eq!(
            receipt.record.checksum.as_deref(),
            Some(format!("{:x}", md5::compute(b"Hello, world!!!!!")).as_str())
        );

        let stored = fx.metadata.lookup(&receipt.record.file_id).unwrap();
        assert_eq!(stored.original_name, "report.txt");
        let path = fx.files.path_for(&receipt.record.file_id, Some("txt"));
        assert_eq!(std::fs::read(path).unwrap(), b"Hello, world!!!!!");
        assert!(receipt.message().contains(&receipt.url));
    }

    #[tokio::test]
    async fn test_ingest_rejects_extension_before_any_io() {
        let fx = fixture(4, 1024, &["txt"]);
        let err = fx
            .service
            .ingest(request("setup.exe", Some(3)), frames(&[b"MZ!"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DropError::Rejected(_)));
        assert!(fx.files.list_files().await.unwrap().is_empty());
        assert_eq!(fx.metadata.record_count(), 0);
    }

    #[test]
    fn test_admit_needs_no_body() {
        let fx = fixture(4, 8, &["txt"]);
        assert_eq!(
            fx.service.admit("My Notes.TXT", Some(8)).unwrap(),
            ("My_Notes.TXT".to_string(), Some("txt".to_string()))
        );
        assert!(matches!(fx.service.admit("setup.exe", Some(2)), Err(DropError::Rejected(_))));
        assert!(matches!(fx.service.admit("big.txt", Some(9)), Err(DropError::PayloadTooLarge { limit: 8 })));
        assert!(matches!(fx.service.admit("..", None), Err(DropError::InvalidFilename(_))));
        assert!(fx.service.admit("unsized.txt", None).is_ok());
    }

    #[tokio::test]
    async fn test_ingest_dropped_connection_commits_nothing() {
        let fx = fixture(4, 1024, &[]);
        let err = fx
            .service
            .ingest(request("big.bin", Some(100)), frames(&[b"only a little"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DropError::IncompleteBody { .. }));
        assert_eq!(fx.metadata.record_count(), 0);
        assert!(fx.files.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_enforces_size_limit() {
        let fx = fixture(4, 8, &[]);
        let err = fx
            .service
            .ingest(request("a.bin", Some(9)), frames(&[b"123456789"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DropError::PayloadTooLarge { limit: 8 }));

        // Without a declared length the running count trips the limit
        let err = fx
            .service
            .ingest(request("a.bin", None), frames(&[b"1234", b"5678", b"9"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DropError::PayloadTooLarge { .. }));
        assert!(fx.files.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_sanitizes_filename() {
        let fx = fixture(1024, 1024, &[]);
        let receipt = fx
            .service
            .ingest(request("../../etc/passwd", Some(4)), frames(&[b"root"]))
            .await
            .unwrap();
        assert_eq!(receipt.record.original_name, "etc_passwd");
        assert_eq!(receipt.record.extension, None);
        assert!(fx.files.path_for(&receipt.record.file_id, None).exists());

        let err = fx.service.ingest(request("..", Some(1)), frames(&[b"x"])).await.unwrap_err();
        assert!(matches!(err, DropError::InvalidFilename(_)));
    }

    #[tokio::test]
    async fn test_ingest_recovers_from_duplicate_key() {
        // A store that reports a collision on the first insert
        struct CollidingOnce {
            inner: MockMetadataStore,
            collided: std::sync::atomic::AtomicBool,
        }
        impl MetadataStorage for CollidingOnce {
            fn insert(&self, record: &UploadRecord) -> Result<(), DropError> {
                if !self.collided.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    return Err(DropError::DuplicateKey(record.file_id.clone()));
                }
                self.inner.insert(record)
            }
            fn lookup(&self, file_id: &str) -> Result<UploadRecord, DropError> {
                self.inner.lookup(file_id)
            }
            fn lookup_by_delete_id(&self, delete_id: &str) -> Result<Option<UploadRecord>, DropError> {
                self.inner.lookup_by_delete_id(delete_id)
            }
            fn list_all(&self) -> Result<Vec<crate::metadata::ListedRecord>, DropError> {
                self.inner.list_all()
            }
            fn delete(&self, file_id: &str) -> Result<(), DropError> {
                self.inner.delete(file_id)
            }
            fn list_expired(&self, now: f64, ttl: f64) -> Result<Vec<crate::metadata::ExpiredRecord>, DropError> {
                self.inner.list_expired(now, ttl)
            }
        }

        let fx = fixture(1024, 1024, &["txt"]);
        let metadata = Arc::new(CollidingOnce {
            inner: MockMetadataStore::new(),
            collided: std::sync::atomic::AtomicBool::new(false),
        });
        let service = UploadService::new(
            metadata.clone(),
            fx.files.clone(),
            ExtensionValidator::new(&["txt".to_string()]),
            1024,
            1024,
            "http://drop.test/".to_string(),
        );

        let receipt = service.ingest(request("a.txt", Some(5)), frames(&[b"hello"])).await.unwrap();

        let stored = fx.files.list_files().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_id, receipt.record.file_id);
        assert_eq!(std::fs::read(&stored[0].path).unwrap(), b"hello");
        assert!(metadata.lookup(&receipt.record.file_id).is_ok());
    }
}
