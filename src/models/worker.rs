use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::states::WorkerStatus;
use crate::error::{Error, Result};

/// Worker represents a node that dequeues and executes task runs. The row is
/// created when the worker process starts and kept fresh by its heartbeat
/// loop; it does not own the task runs it executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub hostname: String,
    pub status: WorkerStatus,
    /// Maximum number of concurrent task runs this worker accepts.
    pub concurrency: i32,
    pub active_tasks: i32,
    pub last_heartbeat: DateTime<Utc>,
}

impl Worker {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.into(),
            status: WorkerStatus::Active,
            concurrency: 1,
            active_tasks: 0,
            last_heartbeat: Utc::now(),
        }
    }

    /// Check that the worker has the minimum required fields.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(Error::invalid("worker hostname must not be empty"));
        }
        if self.concurrency < 1 {
            return Err(Error::invalid("worker concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Report whether a heartbeat has been received within the timeout window.
    pub fn is_alive(&self, timeout: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.last_heartbeat);
        age <= chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_worker_is_alive() {
        let w = Worker::new("worker-1");
        assert!(w.is_alive(Duration::from_secs(45)));
    }

    #[test]
    fn stale_heartbeat_is_not_alive() {
        let mut w = Worker::new("worker-1");
        w.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        assert!(!w.is_alive(Duration::from_secs(45)));
    }

    #[test]
    fn validation_rejects_zero_concurrency() {
        let mut w = Worker::new("worker-1");
        w.concurrency = 0;
        assert!(w.validate().is_err());
        w.concurrency = 1;
        w.hostname.clear();
        assert!(w.validate().is_err());
    }
}
