//! Serving stored files back in bounded chunks.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::DropError;
use crate::metadata::{MetadataStorage, UploadRecord};
use crate::storage::local_store::LocalFileStore;

/// A stored file ready to be streamed.
pub struct OpenedFile {
    pub record: UploadRecord,
    pub path: PathBuf,
    /// Size on disk, used for Content-Length
    pub size: u64,
    file: File,
}

impl OpenedFile {
    /// `Content-Disposition` value carrying the original filename.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename={}", self.record.original_name)
    }

    /// Consume the handle into a stream of chunks of `chunk_size` bytes.
    /// The next read is only issued once the previous chunk was taken.
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        read_chunks(self.file, chunk_size)
    }
}

/// Stream a file as consecutive chunks of up to `chunk_size` bytes.
pub fn read_chunks(file: File, chunk_size: usize) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    let chunk_size = chunk_size.max(1);
    futures::stream::try_unfold(file, move |mut file| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        while buf.len() < chunk_size {
            if file.read_buf(&mut buf).await? == 0 {
                break;
            }
        }
        if buf.is_empty() {
            Ok::<_, std::io::Error>(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    })
}

/// Read-only lookups against the metadata store and upload directory.
pub struct DownloadService {
    metadata: Arc<dyn MetadataStorage>,
    files: Arc<LocalFileStore>,
    chunk_size: usize,
}

impl DownloadService {
    pub fn new(metadata: Arc<dyn MetadataStorage>, files: Arc<LocalFileStore>, chunk_size: usize) -> Self {
        Self { metadata, files, chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resolve and open the file behind `file_id`. Unknown identifiers and
    /// records whose file is missing are both `NotFound`.
    pub async fn open(&self, file_id: &str) -> Result<OpenedFile, DropError> {
        log_mdc::insert("file_id", file_id);
        let opened = self.open_tagged(file_id).await;
        // Workers reuse threads across requests.
        log_mdc::remove("file_id");
        opened
    }

    async fn open_tagged(&self, file_id: &str) -> Result<OpenedFile, DropError> {
        let record = self.metadata.lookup(file_id)?;

        let path = self.files.locate(&record.file_id).await.ok_or_else(|| {
            warn!("Record {} has no file on disk", file_id);
            DropError::NotFound(file_id.to_string())
        })?;

        let file = File::open(&path).await.map_err(|e| {
            warn!("Could not open {}: {}", path.display(), e);
            DropError::NotFound(file_id.to_string())
        })?;
        let size = file.metadata().await?.len();

        info!("Serving {} ({} bytes) as {}", file_id, size, record.original_name);
        debug!("Resolved {} to {}", file_id, path.display());
        Ok(OpenedFile { record, path, size, file })
    }
}
