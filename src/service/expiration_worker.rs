//! Background expiration worker
//!
//! Runs periodically to remove uploads older than the configured TTL, file
//! first and row second, so an interrupted sweep can leave a dangling row but
//! never a servable file without metadata. The same pass collects orphaned
//! files: uploads that never committed a record and have not been written to
//! for longer than the grace period.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time;

use crate::config::ExpirationConfig;
use crate::error::DropError;
use crate::metadata::{now_timestamp, MetadataStorage};
use crate::service::deletion::remove_upload;
use crate::storage::local_store::LocalFileStore;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub expired: usize,
    pub orphans: usize,
    pub failed: usize,
}

/// Background expiration worker
pub struct ExpirationWorker {
    metadata: Arc<dyn MetadataStorage>,
    files: Arc<LocalFileStore>,
    ttl: Duration,
    orphan_grace: Duration,
    sweep_interval: Duration,
}

impl ExpirationWorker {
    pub fn new(metadata: Arc<dyn MetadataStorage>, files: Arc<LocalFileStore>, config: &ExpirationConfig) -> Self {
        Self {
            metadata,
            files,
            ttl: Duration::from_secs(config.expires),
            orphan_grace: Duration::from_secs(config.orphan_grace),
            sweep_interval: Duration::from_secs(config.sweep_interval.max(1)),
        }
    }

    /// Start the worker as a background task (non-blocking)
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting expiration worker: ttl {}s, interval {}s",
            self.ttl.as_secs(),
            self.sweep_interval.as_secs()
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.sweep_interval);

            loop {
                interval.tick().await;

                match self.sweep_once(now_timestamp()).await {
                    Ok(report) if report != SweepReport::default() => {
                        info!(
                            "Sweep removed {} expired uploads and {} orphans ({} failures)",
                            report.expired, report.orphans, report.failed
                        );
                    }
                    Ok(_) => debug!("Sweep found nothing to remove"),
                    Err(e) => error!("Error during expiration sweep: {}", e),
                }
            }
        })
    }

    /// One pass over the store and the upload directory.
    pub async fn sweep_once(&self, now: f64) -> Result<SweepReport, DropError> {
        let mut report = SweepReport::default();

        let expired = self.metadata.list_expired(now, self.ttl.as_secs_f64())?;
        for record in expired {
            debug!("Expiring {} (uploaded at {})", record.file_id, record.timestamp);
            match remove_upload(self.metadata.as_ref(), &self.files, &record.file_id).await {
                Ok(()) => report.expired += 1,
                Err(e) => {
                    // Continue with other records even if one fails
                    error!("Failed to expire {}: {}", record.file_id, e);
                    report.failed += 1;
                }
            }
        }

        report.orphans = self.collect_orphans().await?;
        Ok(report)
    }

    /// Remove files with no record that have been idle past the grace period.
    async fn collect_orphans(&self) -> Result<usize, DropError> {
        let known: HashSet<String> = self
            .metadata
            .list_all()?
            .into_iter()
            .map(|record| record.file_id)
            .collect();

        let mut removed = 0;
        for file in self.files.list_files().await? {
            if known.contains(&file.file_id) {
                continue;
            }
            let idle = file.modified.elapsed().unwrap_or_default();
            if idle < self.orphan_grace {
                continue;
            }
            // Re-check: the upload may have committed since the listing.
            if self.metadata.lookup(&file.file_id).is_ok() {
                continue;
            }
            match self.files.remove(&file.path).await {
                Ok(true) => {
                    info!("Removed orphaned file {}", file.path.display());
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("Could not remove orphan {}: {}", file.path.display(), e),
            }
        }
        Ok(removed)
    }
}
