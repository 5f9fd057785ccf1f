//! Worker pool.
//!
//! A fixed number of worker loops share one [`DownloadQueue`](crate::queue::DownloadQueue).
//! Each loop waits for an admission slot from the controller, takes the next
//! id and runs that job end to end. Extraction calls are blocking and run on
//! Tokio's blocking pool; one worker is one in-flight download.
//!
//! Every per-job failure is turned into a terminal status plus an activity
//! log entry. The loop itself only ends when the controller shuts down.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::{Claim, JobTicket, JobUpdates, LogLevel, QueueController};
use crate::error::{Error, Result};
use crate::extractor::{DownloadOptions, ExtractionClient, ProbeScope};
use crate::job::JobStatus;
use crate::output::{OutputDirectory, output_template};
use crate::progress::ProgressReporter;

/// Handles of the spawned worker loops.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` loops serving `controller`.
    pub fn spawn(
        controller: QueueController,
        client: Arc<dyn ExtractionClient>,
        output: Arc<OutputDirectory>,
        workers: usize,
    ) -> Self {
        let handles = (0..workers)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    controller: controller.clone(),
                    client: Arc::clone(&client),
                    output: Arc::clone(&output),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers, "Worker pool started");
        Self { handles }
    }

    /// Number of worker loops.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every loop to exit. Call after
    /// [`QueueController::shutdown`].
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }
        debug!("Worker pool stopped");
    }
}

struct Worker {
    worker_id: usize,
    controller: QueueController,
    client: Arc<dyn ExtractionClient>,
    output: Arc<OutputDirectory>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.worker_id, "Worker started");
        while let Some(claim) = self.controller.next_job().await {
            match claim {
                Claim::Skip(job_id) => {
                    self.controller
                        .updates_for(job_id)
                        .finish(JobStatus::Cancelled);
                }
                Claim::Run(ticket) => {
                    let updates = self.controller.updates_for(ticket.id);
                    let status = self.execute(&ticket, &updates).await;
                    updates.finish(status);
                }
            }
        }
        debug!(worker = self.worker_id, "Worker stopped");
    }

    /// Run one job and translate the outcome into its terminal status.
    async fn execute(&self, ticket: &JobTicket, updates: &JobUpdates) -> JobStatus {
        info!(job_id = ticket.id, worker = self.worker_id, url = %ticket.request.url, "Starting download");

        match self.download(ticket, updates).await {
            Ok(path) => {
                info!(job_id = ticket.id, path = %path.display(), "Download complete");
                updates.output_path(path);
                JobStatus::Complete
            }
            Err(e) if e.is_cancellation() => {
                info!(job_id = ticket.id, "Download cancelled");
                JobStatus::Cancelled
            }
            // A failure after the user cancelled is reported as the cancel
            Err(e) if ticket.cancelled.is_cancelled() => {
                info!(job_id = ticket.id, "Download cancelled ({})", e);
                JobStatus::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                warn!(job_id = ticket.id, "Download failed: {}", message);
                updates.log(
                    LogLevel::Error,
                    format!("{}: {message}", ticket.request.url),
                );
                JobStatus::Error(message)
            }
        }
    }

    async fn download(&self, ticket: &JobTicket, updates: &JobUpdates) -> Result<PathBuf> {
        if ticket.cancelled.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let info = {
            let client = Arc::clone(&self.client);
            let url = ticket.request.url.clone();
            run_blocking(move || client.probe(&url, ProbeScope::Single)).await?
        };
        debug!(job_id = ticket.id, title = %info.title, "Resolved metadata");
        updates.title(info.title.clone());

        if ticket.cancelled.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let target = self.output.reserve(
            &info.title,
            &info.id,
            ticket.request.format.extension(),
        );
        let options = DownloadOptions::for_request(
            &ticket.request,
            output_template(&target),
            ticket.rate_limit.clone(),
        );
        debug!(
            job_id = ticket.id,
            selector = %options.format_selector,
            target = %target.display(),
            "Prepared download"
        );

        updates.status(JobStatus::Downloading(None));
        let result = {
            let client = Arc::clone(&self.client);
            let url = ticket.request.url.clone();
            let mut reporter = ProgressReporter::new(updates.clone(), ticket.cancelled.clone());
            run_blocking(move || {
                client.download(&url, &options, &mut |event| reporter.report(event))
            })
            .await
        };
        self.output.release(&target);

        result.map(|()| target)
    }
}

/// Run a blocking extraction call off the async worker threads.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Download(format!("Extraction task failed: {e}")))?
}
