use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Task is a single unit of work that belongs to a workflow: a command with
/// retry and timeout parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub command: String,
    /// Maximum number of retries after the first attempt.
    pub retry_count: i32,
    /// Base delay between retries, consumed by the worker's backoff function.
    pub retry_delay_seconds: i32,
    /// Per-attempt execution timeout; 0 means no timeout.
    pub timeout_seconds: i32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(workflow_id: Uuid, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.into(),
            command: command.into(),
            retry_count: 0,
            retry_delay_seconds: 0,
            timeout_seconds: 0,
            created_at: Utc::now(),
        }
    }

    /// Check that the task has the minimum required fields.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("task name must not be empty"));
        }
        if self.retry_count < 0 {
            return Err(Error::invalid("task retry_count must not be negative"));
        }
        if self.retry_delay_seconds < 0 {
            return Err(Error::invalid("task retry_delay_seconds must not be negative"));
        }
        if self.timeout_seconds < 0 {
            return Err(Error::invalid("task timeout_seconds must not be negative"));
        }
        Ok(())
    }

    /// Report whether another attempt is allowed after `attempt` (1-based)
    /// has failed. A task runs at most `1 + retry_count` times.
    pub fn can_retry(&self, attempt: i32) -> bool {
        attempt <= self.retry_count
    }
}

/// TaskDependency records that a task must wait for another task in the same
/// workflow to succeed first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub id: Uuid,
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
}

impl TaskDependency {
    pub fn new(task_id: Uuid, depends_on_task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            depends_on_task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_is_one_plus_retry_count() {
        let mut t = Task::new(Uuid::new_v4(), "extract", "echo hi");
        t.retry_count = 1;
        assert!(t.can_retry(1));
        assert!(!t.can_retry(2));

        t.retry_count = 0;
        assert!(!t.can_retry(1));
    }

    #[test]
    fn validation_rejects_negative_budgets() {
        let mut t = Task::new(Uuid::new_v4(), "load", "echo hi");
        assert!(t.validate().is_ok());
        t.retry_count = -1;
        assert!(t.validate().is_err());
        t.retry_count = 0;
        t.name.clear();
        assert!(t.validate().is_err());
    }
}
