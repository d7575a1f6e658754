use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::states::{RunStatus, TaskRunStatus};

/// WorkflowRun is a single execution instance of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    /// Set if and only if the run reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// TaskRun is one execution of a task inside a workflow run. Retried
/// attempts update the same row in place: `attempt` increments and the
/// handler error is appended to `logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub workflow_run_id: Uuid,
    pub task_id: Uuid,
    pub status: TaskRunStatus,
    /// 1-based attempt counter.
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: String,
}

impl TaskRun {
    pub fn new(workflow_run_id: Uuid, task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_run_id,
            task_id,
            status: TaskRunStatus::Pending,
            attempt: 1,
            started_at: Utc::now(),
            finished_at: None,
            logs: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a line to the run's logs. Logs are append-only until the run
    /// reaches a terminal status.
    pub fn append_log(&mut self, line: &str) {
        if !self.logs.is_empty() && !self.logs.ends_with('\n') {
            self.logs.push('\n');
        }
        self.logs.push_str(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_at_is_omitted_until_set() {
        let run = WorkflowRun::new(Uuid::new_v4());
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("finished_at").is_none());

        let mut run = run;
        run.status = RunStatus::Success;
        run.finished_at = Some(Utc::now());
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("finished_at").is_some());
    }

    #[test]
    fn task_run_round_trips() {
        let mut tr = TaskRun::new(Uuid::new_v4(), Uuid::new_v4());
        tr.status = TaskRunStatus::Success;
        tr.finished_at = Some(Utc::now());
        tr.logs = "hello".into();
        let json = serde_json::to_string(&tr).unwrap();
        let back: TaskRun = serde_json::from_str(&json).unwrap();
        assert_eq!(tr, back);
    }

    #[test]
    fn append_log_separates_lines() {
        let mut tr = TaskRun::new(Uuid::new_v4(), Uuid::new_v4());
        tr.append_log("attempt 1: boom");
        tr.append_log("attempt 2: ok");
        assert_eq!(tr.logs, "attempt 1: boom\nattempt 2: ok");
    }
}
