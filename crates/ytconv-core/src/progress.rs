//! Progress reporting.
//!
//! Translates raw [`ProgressEvent`]s from the extraction client into job
//! status updates and hands them to the controller over its update channel.
//! The reporter runs on the blocking download thread; the controller applies
//! the updates on its own task, so nothing shared is mutated from here.
//!
//! The reporter is also the mid-download cancellation checkpoint: once the
//! job's flag is set, the next event returns [`Error::Cancelled`].

use crate::controller::JobUpdates;
use crate::error::{Error, Result};
use crate::extractor::ProgressEvent;
use crate::job::{CancelFlag, JobStatus};

/// Minimum change in percent before another `Downloading` update is sent.
pub const PROGRESS_THRESHOLD: f64 = 0.5;

/// Compute a percentage from byte counts.
///
/// Prefers the exact total and falls back to the estimate. Returns `None`
/// when neither is known (or zero).
#[must_use]
pub fn percent(downloaded: u64, total: Option<u64>, estimate: Option<u64>) -> Option<f64> {
    let total = total.filter(|t| *t > 0).or_else(|| estimate.filter(|t| *t > 0))?;
    Some((downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

/// Job status for a progress event.
#[must_use]
pub fn status_for(event: ProgressEvent) -> JobStatus {
    match event {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
        } => JobStatus::Downloading(percent(
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
        )),
        ProgressEvent::Finished | ProgressEvent::PostProcessing => JobStatus::Processing,
    }
}

/// Per-job progress callback state.
pub struct ProgressReporter {
    updates: JobUpdates,
    cancelled: CancelFlag,
    last_sent: Option<JobStatus>,
}

impl ProgressReporter {
    pub(crate) const fn new(updates: JobUpdates, cancelled: CancelFlag) -> Self {
        Self {
            updates,
            cancelled,
            last_sent: None,
        }
    }

    /// Handle one event from the extraction client.
    ///
    /// Returns [`Error::Cancelled`] if the job was cancelled, which the
    /// client propagates to abort the download.
    pub fn report(&mut self, event: ProgressEvent) -> Result<()> {
        if self.cancelled.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let status = status_for(event);
        if self.should_send(&status) {
            self.updates.status(status.clone());
            self.last_sent = Some(status);
        }
        Ok(())
    }

    fn should_send(&self, next: &JobStatus) -> bool {
        match (&self.last_sent, next) {
            (None, _) => true,
            (Some(JobStatus::Downloading(Some(prev))), JobStatus::Downloading(Some(now))) => {
                (now - prev).abs() >= PROGRESS_THRESHOLD || (*now >= 100.0 && *prev < 100.0)
            }
            (Some(prev), now) => prev != now,
        }
    }
}
