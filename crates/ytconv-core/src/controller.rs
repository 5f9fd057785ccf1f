//! Queue controller.
//!
//! The [`QueueController`] is the single authority over admission,
//! pause/resume, cancellation and drain detection. It owns:
//!
//! - the job map (keyed by monotonically increasing [`JobId`]s),
//! - the admission counters (`active_count`, `max_concurrency`, `paused`),
//! - the [`DownloadQueue`] workers pull from,
//! - a slot semaphore through which admission is granted to workers.
//!
//! Workers never touch shared state directly. They report through a
//! [`JobUpdates`] handle, and a single update task applies those messages
//! under the state lock and broadcasts [`QueueEvent`]s to subscribers.
//!
//! # Admission
//!
//! `admit()` runs after every event that can add work or free capacity. Each
//! grant increments `active_count` and adds one permit to the slot
//! semaphore; a worker must take a permit before it may dequeue. Grants not
//! yet picked up are tracked in `grants_outstanding` so the controller never
//! grants more slots than there are queued ids.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, PostQueueAction, QueueConfig, clamp_concurrency, validate_rate_limit};
use crate::error::{Error, Result};
use crate::extractor::ExtractionClient;
use crate::job::{CancelFlag, DownloadRequest, Job, JobId, JobStatus, MediaFormat, Quality, now_millis};
use crate::output::OutputDirectory;
use crate::queue::DownloadQueue;
use crate::worker::WorkerPool;

/// Maximum number of entries kept in the activity log.
pub const ACTIVITY_LOG_CAPACITY: usize = 500;

/// Buffer size of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Severity of an activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Something unexpected that did not fail a job.
    Warning,
    /// A job failed.
    Error,
}

/// One line of the accumulating activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix millis.
    pub timestamp: u64,
    /// Job the entry belongs to, if any.
    pub job_id: Option<JobId>,
    /// Severity.
    pub level: LogLevel,
    /// Detailed message.
    pub message: String,
}

/// Event types emitted by the queue controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum QueueEvent {
    /// A job was added or its title or status changed.
    JobChanged {
        /// The job ID.
        job_id: JobId,
        /// Current title.
        title: String,
        /// Current status.
        status: JobStatus,
    },
    /// Finished jobs were removed by `clear_finished`.
    JobsRemoved {
        /// The removed job IDs.
        job_ids: Vec<JobId>,
    },
    /// Admission was paused.
    Paused,
    /// Admission was resumed.
    Resumed,
    /// The concurrency limit changed.
    ConcurrencyChanged {
        /// The effective limit.
        max_concurrency: usize,
    },
    /// An entry was appended to the activity log.
    LogAppended(LogEntry),
    /// No job is pending or running any more.
    Drained {
        /// The post-queue action configured at the time.
        action: PostQueueAction,
    },
}

/// Statistics about the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of tracked jobs.
    pub total_jobs: usize,
    /// Jobs waiting for a worker.
    pub queued_count: usize,
    /// Jobs probing metadata.
    pub fetching_count: usize,
    /// Jobs transferring media.
    pub downloading_count: usize,
    /// Jobs post-processing.
    pub processing_count: usize,
    /// Jobs waiting for a worker to notice a cancel.
    pub cancelling_count: usize,
    /// Completed jobs.
    pub completed_count: usize,
    /// Failed jobs.
    pub failed_count: usize,
    /// Cancelled jobs.
    pub cancelled_count: usize,
    /// Admission slots currently held.
    pub active_count: usize,
    /// Ids still in the download queue.
    pub pending_count: usize,
    /// Current concurrency limit.
    pub max_concurrency: usize,
    /// Whether admission is paused.
    pub paused: bool,
}

/// Hook invoked once per drain when a post-queue action is configured.
///
/// Implementations perform (or announce) the OS power action.
#[cfg_attr(test, mockall::automock)]
pub trait PostQueueHook: Send + Sync {
    /// Called after the queue drained with a non-`None` action.
    fn on_queue_drained(&self, action: PostQueueAction);
}

/// Hook that only logs the requested action.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

impl PostQueueHook for LoggingHook {
    fn on_queue_drained(&self, action: PostQueueAction) {
        info!("Queue drained, post-queue action requested: {action}");
    }
}

/// Command interface exposed to UI adapters.
pub trait QueueCommands: Send + Sync {
    /// Queue requests; returns the assigned ids in submission order.
    fn submit(
        &self,
        requests: Vec<DownloadRequest>,
    ) -> impl Future<Output = Result<Vec<JobId>>> + Send;

    /// Cancel a job. Returns `false` if it had already finished.
    fn cancel(&self, job_id: JobId) -> impl Future<Output = Result<bool>> + Send;

    /// Stop admitting new jobs.
    fn pause(&self) -> impl Future<Output = ()> + Send;

    /// Resume admission; returns how many jobs were admitted.
    fn resume(&self) -> impl Future<Output = usize> + Send;

    /// Remove finished jobs; returns their ids.
    fn clear_finished(&self) -> impl Future<Output = Vec<JobId>> + Send;

    /// Change the concurrency limit; returns the effective value.
    fn set_concurrency(&self, n: usize) -> impl Future<Output = usize> + Send;

    /// Choose what happens when the queue drains.
    fn set_post_queue_action(&self, action: PostQueueAction) -> impl Future<Output = ()> + Send;

    /// Subscribe to job and queue events.
    fn subscribe(&self) -> broadcast::Receiver<QueueEvent>;
}

/// Messages sent from workers to the update task.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Status { job_id: JobId, status: JobStatus },
    Title { job_id: JobId, title: String },
    OutputPath { job_id: JobId, path: PathBuf },
    Log { job_id: JobId, level: LogLevel, message: String },
    Finished { job_id: JobId, status: JobStatus },
}

/// Per-job sender used by workers and progress reporters.
#[derive(Debug, Clone)]
pub(crate) struct JobUpdates {
    job_id: JobId,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl JobUpdates {
    pub(crate) const fn new(job_id: JobId, tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self { job_id, tx }
    }

    fn send(&self, message: WorkerMessage) {
        if self.tx.send(message).is_err() {
            debug!(job_id = self.job_id, "Controller gone, dropping job update");
        }
    }

    pub(crate) fn status(&self, status: JobStatus) {
        self.send(WorkerMessage::Status {
            job_id: self.job_id,
            status,
        });
    }

    pub(crate) fn title(&self, title: String) {
        self.send(WorkerMessage::Title {
            job_id: self.job_id,
            title,
        });
    }

    pub(crate) fn output_path(&self, path: PathBuf) {
        self.send(WorkerMessage::OutputPath {
            job_id: self.job_id,
            path,
        });
    }

    pub(crate) fn log(&self, level: LogLevel, message: String) {
        self.send(WorkerMessage::Log {
            job_id: self.job_id,
            level,
            message,
        });
    }

    /// Report the terminal status and release the admission slot.
    pub(crate) fn finish(&self, status: JobStatus) {
        self.send(WorkerMessage::Finished {
            job_id: self.job_id,
            status,
        });
    }
}

/// What a worker should do with a dequeued id.
#[derive(Debug)]
pub(crate) enum Claim {
    /// Execute the job.
    Run(JobTicket),
    /// The job was cancelled or cleared while queued.
    Skip(JobId),
}

/// Everything a worker needs to execute one job.
#[derive(Debug, Clone)]
pub(crate) struct JobTicket {
    pub(crate) id: JobId,
    pub(crate) request: DownloadRequest,
    pub(crate) cancelled: CancelFlag,
    pub(crate) rate_limit: Option<String>,
}

/// Internal state protected by the controller lock.
struct QueueState {
    jobs: BTreeMap<JobId, Job>,
    next_id: JobId,
    active_count: usize,
    max_concurrency: usize,
    paused: bool,
    grants_outstanding: usize,
    drain_armed: bool,
    stopped: bool,
    rate_limit: Option<String>,
    post_queue_action: PostQueueAction,
    activity_log: VecDeque<LogEntry>,
}

impl QueueState {
    fn new(max_concurrency: usize) -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
            active_count: 0,
            max_concurrency,
            paused: false,
            grants_outstanding: 0,
            drain_armed: false,
            stopped: false,
            rate_limit: None,
            post_queue_action: PostQueueAction::None,
            activity_log: VecDeque::with_capacity(ACTIVITY_LOG_CAPACITY),
        }
    }

    const fn next_job_id(&mut self) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

struct Shared {
    state: RwLock<QueueState>,
    queue: DownloadQueue,
    slots: Semaphore,
    worker_count: usize,
    updates: mpsc::UnboundedSender<WorkerMessage>,
    events: broadcast::Sender<QueueEvent>,
    hook: Arc<dyn PostQueueHook>,
}

impl Shared {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_job(&self, job: &Job) {
        self.emit(QueueEvent::JobChanged {
            job_id: job.id,
            title: job.title.clone(),
            status: job.status.clone(),
        });
    }

    /// Grant slots while capacity and queued work remain.
    fn admit(&self, state: &mut QueueState) -> usize {
        let mut granted = 0;
        while !state.paused
            && !state.stopped
            && state.active_count < state.max_concurrency
            && self.queue.len() > state.grants_outstanding
        {
            state.active_count += 1;
            state.grants_outstanding += 1;
            granted += 1;
        }

        if granted > 0 {
            self.slots.add_permits(granted);
            debug!(
                granted,
                active = state.active_count,
                max = state.max_concurrency,
                "Admitted jobs"
            );
        }
        granted
    }

    fn push_log(
        &self,
        state: &mut QueueState,
        job_id: Option<JobId>,
        level: LogLevel,
        message: String,
    ) {
        if state.activity_log.len() >= ACTIVITY_LOG_CAPACITY {
            state.activity_log.pop_front();
        }
        let entry = LogEntry {
            timestamp: now_millis(),
            job_id,
            level,
            message,
        };
        state.activity_log.push_back(entry.clone());
        self.emit(QueueEvent::LogAppended(entry));
    }

    /// Detect the drained state once per cycle.
    fn check_drain(&self, state: &mut QueueState) -> Option<PostQueueAction> {
        if state.drain_armed
            && state.active_count == 0
            && state.grants_outstanding == 0
            && self.queue.is_empty()
        {
            state.drain_armed = false;
            let action = state.post_queue_action;
            info!(%action, "Download queue drained");
            self.emit(QueueEvent::Drained { action });
            Some(action)
        } else {
            None
        }
    }

    /// Apply one worker message. Returns the action to fire if the queue
    /// drained as a result.
    async fn apply(&self, message: WorkerMessage) -> Option<PostQueueAction> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        match message {
            WorkerMessage::Status { job_id, status } => {
                if let Some(job) = state.jobs.get_mut(&job_id)
                    && !job.status.is_terminal()
                    && job.status != JobStatus::Cancelling
                    && job.status != status
                {
                    job.status = status;
                    self.emit_job(job);
                }
                None
            }
            WorkerMessage::Title { job_id, title } => {
                if let Some(job) = state.jobs.get_mut(&job_id) {
                    job.title = title;
                    self.emit_job(job);
                }
                None
            }
            WorkerMessage::OutputPath { job_id, path } => {
                if let Some(job) = state.jobs.get_mut(&job_id) {
                    job.output_path = Some(path);
                }
                None
            }
            WorkerMessage::Log {
                job_id,
                level,
                message,
            } => {
                self.push_log(state, Some(job_id), level, message);
                None
            }
            WorkerMessage::Finished { job_id, status } => {
                if let Some(job) = state.jobs.get_mut(&job_id)
                    && !job.status.is_terminal()
                {
                    job.status = status;
                    self.emit_job(job);
                }

                debug_assert!(state.active_count > 0, "slot released twice");
                state.active_count = state.active_count.saturating_sub(1);
                debug!(job_id, active = state.active_count, "Released slot");

                let drained = self.check_drain(state);
                self.admit(state);
                drained
            }
        }
    }
}

/// Apply worker messages until every sender is gone.
async fn run_update_loop(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
    while let Some(message) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        if let Some(action) = shared.apply(message).await
            && action != PostQueueAction::None
        {
            shared.hook.on_queue_drained(action);
        }
    }
    debug!("Update loop stopped");
}

/// Handle to the queue controller. Cheap to clone.
#[derive(Clone)]
pub struct QueueController {
    shared: Arc<Shared>,
}

impl QueueController {
    /// Create a controller and spawn its update task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &QueueConfig, hook: Arc<dyn PostQueueHook>) -> Self {
        let mut config = config.clone();
        config.validate();

        let (updates, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            state: RwLock::new(QueueState::new(config.max_concurrent_downloads)),
            queue: DownloadQueue::new(),
            slots: Semaphore::new(0),
            worker_count: config.worker_count,
            updates,
            events,
            hook,
        });

        tokio::spawn(run_update_loop(Arc::downgrade(&shared), rx));

        info!(
            max_concurrency = config.max_concurrent_downloads,
            workers = config.worker_count,
            "Queue controller created"
        );
        Self { shared }
    }

    /// Create a controller from application settings and start its worker
    /// pool.
    pub async fn start(
        config: &AppConfig,
        client: Arc<dyn ExtractionClient>,
        output: Arc<OutputDirectory>,
        hook: Arc<dyn PostQueueHook>,
    ) -> Result<(Self, WorkerPool)> {
        let controller = Self::new(&config.queue, hook);
        controller.set_rate_limit(config.rate_limit.clone()).await?;
        controller
            .set_post_queue_action(config.post_queue_action)
            .await;

        let pool = WorkerPool::spawn(
            controller.clone(),
            client,
            output,
            controller.worker_count(),
        );
        Ok((controller, pool))
    }

    /// Number of worker loops this controller was sized for.
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Queue download requests.
    ///
    /// An empty input changes nothing.
    pub async fn submit(&self, requests: Vec<DownloadRequest>) -> Result<Vec<JobId>> {
        if requests.is_empty() {
            debug!("Empty submission ignored");
            return Ok(Vec::new());
        }

        let mut guard = self.shared.state.write().await;
        let state = &mut *guard;
        if state.stopped {
            return Err(Error::ControllerStopped);
        }

        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let id = state.next_job_id();
            let job = Job::new(id, request);
            info!(
                job_id = id,
                url = %job.request.url,
                format = %job.request.format,
                quality = %job.request.quality,
                "Queued download"
            );
            self.shared.emit_job(&job);
            state.jobs.insert(id, job);
            self.shared.queue.enqueue(id);
            ids.push(id);
        }

        state.drain_armed = true;
        self.shared.admit(state);
        Ok(ids)
    }

    /// Queue URLs with one format and quality label.
    pub async fn submit_urls<I, S>(
        &self,
        urls: I,
        format: MediaFormat,
        quality: &str,
    ) -> Result<Vec<JobId>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let quality = Quality::parse(format, quality)?;
        let requests = urls
            .into_iter()
            .map(|url| DownloadRequest::new(url, format, quality))
            .collect::<Result<Vec<_>>>()?;
        self.submit(requests).await
    }

    /// Cancel a job.
    ///
    /// A queued job becomes `Cancelled` immediately and is skipped by the
    /// worker that dequeues it. A running job becomes `Cancelling` until its
    /// worker observes the flag. Returns `false` for jobs that already
    /// finished or are already being cancelled.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool> {
        let mut state = self.shared.state.write().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(Error::JobNotFound(job_id))?;

        if job.is_finished() || job.cancelled.is_cancelled() {
            debug!(job_id, status = %job.status, "Cancel ignored");
            return Ok(false);
        }

        Self::cancel_job(&self.shared, job);
        Ok(true)
    }

    /// Cancel every unfinished job. Returns how many were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let mut state = self.shared.state.write().await;
        let mut count = 0;
        for job in state.jobs.values_mut() {
            if !job.is_finished() && !job.cancelled.is_cancelled() {
                Self::cancel_job(&self.shared, job);
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "Cancelled all unfinished jobs");
        }
        count
    }

    fn cancel_job(shared: &Shared, job: &mut Job) {
        job.cancelled.cancel();
        job.status = if job.status.is_in_flight() {
            JobStatus::Cancelling
        } else {
            JobStatus::Cancelled
        };
        info!(job_id = job.id, status = %job.status, "Cancel requested");
        shared.emit_job(job);
    }

    /// Stop admitting new jobs. Running jobs are not affected.
    pub async fn pause(&self) {
        let mut state = self.shared.state.write().await;
        if !state.paused {
            state.paused = true;
            info!("Queue paused");
            self.shared.emit(QueueEvent::Paused);
        }
    }

    /// Resume admission. Returns the number of jobs admitted.
    pub async fn resume(&self) -> usize {
        let mut state = self.shared.state.write().await;
        if state.paused {
            state.paused = false;
            info!("Queue resumed");
            self.shared.emit(QueueEvent::Resumed);
        }
        self.shared.admit(&mut state)
    }

    /// Whether admission is paused.
    pub async fn is_paused(&self) -> bool {
        self.shared.state.read().await.paused
    }

    /// Remove all finished jobs. Ids are never reused, so the remaining jobs
    /// keep resolving under the same ids.
    pub async fn clear_finished(&self) -> Vec<JobId> {
        let mut state = self.shared.state.write().await;
        let removed: Vec<JobId> = state
            .jobs
            .values()
            .filter(|job| job.is_finished())
            .map(|job| job.id)
            .collect();

        for id in &removed {
            state.jobs.remove(id);
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "Cleared finished jobs");
            self.shared.emit(QueueEvent::JobsRemoved {
                job_ids: removed.clone(),
            });
        }
        removed
    }

    /// Change the concurrency limit.
    ///
    /// The value is clamped to `1..=20` and to the worker count. Lowering it
    /// below the number of running jobs lets them finish; new admissions
    /// wait until the count drops under the new limit.
    pub async fn set_concurrency(&self, n: usize) -> usize {
        let effective = clamp_concurrency(n).min(self.shared.worker_count);
        if effective != n {
            warn!(requested = n, effective, "Concurrency limit clamped");
        }

        let mut state = self.shared.state.write().await;
        if state.max_concurrency != effective {
            state.max_concurrency = effective;
            info!(max_concurrency = effective, "Concurrency limit changed");
            self.shared.emit(QueueEvent::ConcurrencyChanged {
                max_concurrency: effective,
            });
        }
        self.shared.admit(&mut state);
        effective
    }

    /// Current concurrency limit.
    pub async fn max_concurrency(&self) -> usize {
        self.shared.state.read().await.max_concurrency
    }

    /// Choose what happens when the queue drains.
    pub async fn set_post_queue_action(&self, action: PostQueueAction) {
        let mut state = self.shared.state.write().await;
        if state.post_queue_action != action {
            info!(%action, "Post-queue action changed");
            state.post_queue_action = action;
        }
    }

    /// The configured post-queue action.
    pub async fn post_queue_action(&self) -> PostQueueAction {
        self.shared.state.read().await.post_queue_action
    }

    /// Set the rate limit applied to downloads that start from now on.
    pub async fn set_rate_limit(&self, limit: Option<String>) -> Result<()> {
        let limit = limit
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if let Some(l) = &limit {
            validate_rate_limit(l)?;
        }

        let mut state = self.shared.state.write().await;
        if state.rate_limit != limit {
            info!(rate_limit = ?limit, "Rate limit changed");
            state.rate_limit = limit;
        }
        Ok(())
    }

    /// Current rate limit.
    pub async fn rate_limit(&self) -> Option<String> {
        self.shared.state.read().await.rate_limit.clone()
    }

    /// All tracked jobs, ordered by id.
    pub async fn jobs(&self) -> Vec<Job> {
        self.shared.state.read().await.jobs.values().cloned().collect()
    }

    /// One job by id.
    pub async fn job(&self, job_id: JobId) -> Option<Job> {
        self.shared.state.read().await.jobs.get(&job_id).cloned()
    }

    /// Calculate queue statistics.
    pub async fn stats(&self) -> QueueStats {
        let state = self.shared.state.read().await;
        let mut stats = QueueStats {
            total_jobs: state.jobs.len(),
            active_count: state.active_count,
            pending_count: self.shared.queue.len(),
            max_concurrency: state.max_concurrency,
            paused: state.paused,
            ..QueueStats::default()
        };

        for job in state.jobs.values() {
            match &job.status {
                JobStatus::Queued => stats.queued_count += 1,
                JobStatus::Fetching => stats.fetching_count += 1,
                JobStatus::Downloading(_) => stats.downloading_count += 1,
                JobStatus::Processing => stats.processing_count += 1,
                JobStatus::Cancelling => stats.cancelling_count += 1,
                JobStatus::Complete => stats.completed_count += 1,
                JobStatus::Error(_) => stats.failed_count += 1,
                JobStatus::Cancelled => stats.cancelled_count += 1,
            }
        }
        stats
    }

    /// Snapshot of the activity log, oldest first.
    pub async fn activity_log(&self) -> Vec<LogEntry> {
        self.shared
            .state
            .read()
            .await
            .activity_log
            .iter()
            .cloned()
            .collect()
    }

    /// Subscribe to job and queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Stop accepting work and let idle workers exit.
    ///
    /// Running downloads are not interrupted; cancel them first if needed.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.state.write().await;
            if state.stopped {
                return;
            }
            state.stopped = true;
        }
        self.shared.queue.close();
        self.shared.slots.close();
        info!("Queue controller shut down");
    }

    /// Wait for an admission slot and the next queued id.
    ///
    /// Returns `None` once the controller is shut down.
    pub(crate) async fn next_job(&self) -> Option<Claim> {
        let permit = self.shared.slots.acquire().await.ok()?;
        permit.forget();
        let job_id = self.shared.queue.dequeue().await?;
        Some(self.claim(job_id).await)
    }

    async fn claim(&self, job_id: JobId) -> Claim {
        let mut guard = self.shared.state.write().await;
        let state = &mut *guard;
        state.grants_outstanding = state.grants_outstanding.saturating_sub(1);
        let rate_limit = state.rate_limit.clone();

        let claim = match state.jobs.get_mut(&job_id) {
            Some(job) if !job.is_finished() && !job.cancelled.is_cancelled() => {
                job.status = JobStatus::Fetching;
                self.shared.emit_job(job);
                Claim::Run(JobTicket {
                    id: job_id,
                    request: job.request.clone(),
                    cancelled: job.cancelled.clone(),
                    rate_limit,
                })
            }
            _ => {
                debug!(job_id, "Skipping cancelled or cleared job");
                Claim::Skip(job_id)
            }
        };

        // A grant may have been withheld while this id was between dequeue and claim
        self.shared.admit(state);
        claim
    }

    /// Update handle for one job.
    pub(crate) fn updates_for(&self, job_id: JobId) -> JobUpdates {
        JobUpdates::new(job_id, self.shared.updates.clone())
    }

    /// Record a controller-level activity log entry.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{message}"),
            LogLevel::Warning => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        let mut state = self.shared.state.write().await;
        self.shared.push_log(&mut state, None, level, message);
    }
}

impl QueueCommands for QueueController {
    fn submit(
        &self,
        requests: Vec<DownloadRequest>,
    ) -> impl Future<Output = Result<Vec<JobId>>> + Send {
        Self::submit(self, requests)
    }

    fn cancel(&self, job_id: JobId) -> impl Future<Output = Result<bool>> + Send {
        Self::cancel(self, job_id)
    }

    fn pause(&self) -> impl Future<Output = ()> + Send {
        Self::pause(self)
    }

    fn resume(&self) -> impl Future<Output = usize> + Send {
        Self::resume(self)
    }

    fn clear_finished(&self) -> impl Future<Output = Vec<JobId>> + Send {
        Self::clear_finished(self)
    }

    fn set_concurrency(&self, n: usize) -> impl Future<Output = usize> + Send {
        Self::set_concurrency(self, n)
    }

    fn set_post_queue_action(&self, action: PostQueueAction) -> impl Future<Output = ()> + Send {
        Self::set_post_queue_action(self, action)
    }

    fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        Self::subscribe(self)
    }
}
