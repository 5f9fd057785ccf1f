//! Download queue: the FIFO buffer of job ids waiting for a worker.
//!
//! The queue is unbounded on purpose. Submission comes from a user pasting
//! URLs, so `enqueue` never blocks and the UI gets instant feedback; there is
//! no backpressure toward the producer.
//!
//! Consumers block in [`DownloadQueue::dequeue`] until an id is available or
//! the queue is closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::job::JobId;

/// Thread-safe FIFO of pending job ids.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    items: Mutex<VecDeque<JobId>>,
    available: Notify,
    closed: AtomicBool,
}

impl DownloadQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<JobId>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an id to the tail. Never blocks.
    pub fn enqueue(&self, id: JobId) {
        self.items().push_back(id);
        trace!(job_id = id, "Enqueued job");
        self.available.notify_one();
    }

    /// Remove and return the head without waiting.
    pub fn try_dequeue(&self) -> Option<JobId> {
        self.items().pop_front()
    }

    /// Remove and return the head, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and drained of waiters.
    pub async fn dequeue(&self) -> Option<JobId> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a close or enqueue in between is not missed.
            notified.as_mut().enable();

            if let Some(id) = self.try_dequeue() {
                return Some(id);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Number of queued ids.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether no ids are queued.
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Wake all waiting consumers and make further `dequeue` calls return
    /// `None` once the buffer is empty.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Download queue closed");
        }
        self.available.notify_waiters();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
