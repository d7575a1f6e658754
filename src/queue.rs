//! Ordered, blocking, cancellation-aware handoff between the scheduler and
//! workers.
//!
//! Contents are held in process memory only; tasks waiting here when the
//! process stops are lost. At most one dequeuer receives any given item.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Task;

/// Work item carried through the queue: the task-run row to execute plus the
/// task definition, so workers need no extra repository read per dequeue.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task_run_id: Uuid,
    pub workflow_run_id: Uuid,
    pub task: Task,
}

/// Thread-safe, unbounded, FIFO in-memory task queue.
#[derive(Default)]
pub struct TaskQueue {
    buf: Mutex<VecDeque<QueuedTask>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to the tail of the queue and wake one blocked dequeuer.
    /// Never blocks and always succeeds.
    pub fn enqueue(&self, item: QueuedTask) {
        self.buf
            .lock()
            .expect("queue mutex poisoned")
            .push_back(item);
        self.notify.notify_one();
    }

    /// Remove and return the head item. Blocks until an item is available or
    /// `cancel` fires, in which case `Error::QueueEmpty` is returned.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<QueuedTask> {
        loop {
            if let Some(item) = self.pop() {
                return Ok(item);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::QueueEmpty),
                _ = self.notify.notified() => {}
            }
        }
    }

    fn pop(&self) -> Option<QueuedTask> {
        let mut buf = self.buf.lock().expect("queue mutex poisoned");
        let item = buf.pop_front();
        // Re-signal so another waiting dequeuer can progress while items
        // remain.
        if item.is_some() && !buf.is_empty() {
            self.notify.notify_one();
        }
        item
    }

    /// Snapshot of the current queue depth.
    pub fn len(&self) -> usize {
        self.buf.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
