// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Replication queue worker
//!
//! A single polling loop drains pending jobs:
//! `Pending -> InProgress -> Completed | Failed`. Failed jobs are never
//! retried; a caller submits a new job instead. When nothing is pending the
//! worker sleeps for the poll interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use ussp_storage::{content_fingerprint, AdapterRegistry, StorageAdapter};

use crate::model::{JobStatus, ReplicationJob};
use crate::persistence::{Persistence, PersistenceResult};

/// Default sleep between empty polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of jobs claimed per poll
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Copies file bytes between adapters for queued backup jobs
#[derive(Debug, Clone)]
pub struct ReplicationQueue {
    persistence: Arc<dyn Persistence>,
    registry: Arc<AdapterRegistry>,
    batch_size: usize,
    poll_interval: Duration,
}

impl ReplicationQueue {
    /// Create a queue with default batch size and poll interval
    pub fn new(persistence: Arc<dyn Persistence>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            persistence,
            registry,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Jobs claimed per poll (at least one)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sleep between empty polls
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Return jobs left `InProgress` by a previous process to `Pending`
    ///
    /// Only safe while no other worker shares the persistence backend.
    pub async fn recover_stale_jobs(&self) -> PersistenceResult<usize> {
        let recovered = self.persistence.reset_in_progress_jobs().await?;
        if recovered > 0 {
            warn!(recovered, "Reset interrupted replication jobs to pending");
        }
        Ok(recovered)
    }

    /// Claim and process one batch, returning how many jobs were handled
    pub async fn run_once(&self) -> PersistenceResult<usize> {
        let jobs = self.persistence.claim_pending_jobs(self.batch_size).await?;
        for job in &jobs {
            if let Err(e) = self.process_job(job).await {
                error!(job_id = %job.id, error = %e, "Could not record replication outcome");
            }
        }
        Ok(jobs.len())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, file_id = %job.file_id))]
    async fn process_job(&self, job: &ReplicationJob) -> PersistenceResult<()> {
        match self.replicate(job).await {
            Ok(size) => {
                self.persistence
                    .finish_job(&job.id, JobStatus::Completed, None)
                    .await?;
                info!(
                    source = %job.source_adapter_id,
                    target = %job.target_adapter_id,
                    size,
                    "Replication completed"
                );
            }
            Err(message) => {
                warn!(
                    source = %job.source_adapter_id,
                    target = %job.target_adapter_id,
                    error = %message,
                    "Replication failed"
                );
                self.persistence
                    .finish_job(&job.id, JobStatus::Failed, Some(message))
                    .await?;
            }
        }
        Ok(())
    }

    /// Copy one file; the error string becomes the job's `error_message`
    async fn replicate(&self, job: &ReplicationJob) -> Result<u64, String> {
        let file = self
            .persistence
            .get_file(&job.file_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "file not found".to_string())?;

        let source = self.adapter(&job.source_adapter_id).await?;
        let target = self.adapter(&job.target_adapter_id).await?;

        let data = source
            .download(&file.namespace_id, &file.path)
            .await
            .map_err(|e| e.to_string())?;

        if content_fingerprint(&data) != file.content_fingerprint {
            return Err(format!(
                "content fingerprint mismatch on source adapter {}",
                job.source_adapter_id
            ));
        }

        let location = target
            .upload(&file.namespace_id, &file.path, &data, Some(&file.mime_type))
            .await
            .map_err(|e| e.to_string())?;
        debug!(address = %location.address, "Wrote replica");

        Ok(location.size)
    }

    async fn adapter(&self, adapter_id: &str) -> Result<Arc<dyn StorageAdapter>, String> {
        let descriptor = self
            .persistence
            .get_adapter(adapter_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "adapter not found".to_string())?;
        self.registry
            .resolve(&descriptor)
            .await
            .map_err(|e| e.to_string())
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            "Replication worker started"
        );

        while !shutdown.is_cancelled() {
            match self.run_once().await {
                // A full batch may mean more work is waiting
                Ok(handled) if handled >= self.batch_size => continue,
                Ok(handled) => {
                    if handled > 0 {
                        debug!(handled, "Replication batch done");
                    }
                }
                Err(e) => error!(error = %e, "Replication poll failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Replication worker stopped");
    }

    /// Run the worker on its own task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
