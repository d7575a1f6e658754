//! Persistence ports for the scheduler core.
//!
//! One contract per aggregate root. Every operation accepts the ambient
//! cancellation token first and honours it; missing records surface as the
//! `Error::NotFound` sentinel so callers can distinguish "absent" from
//! "backend failure". Implementations must return deep-independent copies:
//! mutating a returned value never mutates stored state.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    RunStatus, Task, TaskDependency, TaskRun, TaskRunStatus, Worker, Workflow, WorkflowRun,
};

/// CRUD and query operations for [`Workflow`] entities.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, cancel: &CancellationToken, wf: &Workflow) -> Result<()>;
    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<Workflow>;
    async fn update(&self, cancel: &CancellationToken, wf: &Workflow) -> Result<()>;
    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<()>;
    /// All workflows, newest first.
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Workflow>>;
    /// Only workflows with `is_active = true`, newest first.
    async fn list_active(&self, cancel: &CancellationToken) -> Result<Vec<Workflow>>;
}

/// CRUD and query operations for [`Task`] entities and their dependency
/// edges. Dependencies belong to the task aggregate: they are written when
/// the workflow's tasks are created and read by the DAG resolver.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, cancel: &CancellationToken, task: &Task) -> Result<()>;
    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<Task>;
    async fn update(&self, cancel: &CancellationToken, task: &Task) -> Result<()>;
    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<()>;
    /// All tasks belonging to the workflow, oldest first.
    async fn list_by_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<Vec<Task>>;
    async fn create_dependency(
        &self,
        cancel: &CancellationToken,
        dep: &TaskDependency,
    ) -> Result<()>;
    /// All dependency edges between tasks of the workflow.
    async fn list_dependencies(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<Vec<TaskDependency>>;
}

/// CRUD and query operations for [`WorkflowRun`] entities.
#[async_trait]
pub trait WorkflowRunRepository: Send + Sync {
    async fn create(&self, cancel: &CancellationToken, run: &WorkflowRun) -> Result<()>;
    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<WorkflowRun>;
    /// Atomically update status and the optional finished timestamp.
    async fn update_status(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// All runs for the workflow, newest first.
    async fn list_by_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowRun>>;
    /// All runs with the given status, newest first.
    async fn list_by_status(
        &self,
        cancel: &CancellationToken,
        status: RunStatus,
    ) -> Result<Vec<WorkflowRun>>;
}

/// CRUD and query operations for [`TaskRun`] entities.
#[async_trait]
pub trait TaskRunRepository: Send + Sync {
    async fn create(&self, cancel: &CancellationToken, run: &TaskRun) -> Result<()>;
    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<TaskRun>;
    /// Overwrite all mutable fields. Used by the worker's retry machinery,
    /// which bumps `attempt` and appends to `logs` in place.
    async fn update(&self, cancel: &CancellationToken, run: &TaskRun) -> Result<()>;
    /// Atomically update status and the optional finished timestamp.
    async fn update_status(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        status: TaskRunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn list_by_workflow_run(
        &self,
        cancel: &CancellationToken,
        workflow_run_id: Uuid,
    ) -> Result<Vec<TaskRun>>;
    /// All runs of one task definition across workflow runs.
    async fn list_by_task(&self, cancel: &CancellationToken, task_id: Uuid)
        -> Result<Vec<TaskRun>>;
    async fn list_by_status(
        &self,
        cancel: &CancellationToken,
        status: TaskRunStatus,
    ) -> Result<Vec<TaskRun>>;
}

/// CRUD and query operations for [`Worker`] registrations.
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn create(&self, cancel: &CancellationToken, worker: &Worker) -> Result<()>;
    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<Worker>;
    async fn update(&self, cancel: &CancellationToken, worker: &Worker) -> Result<()>;
    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<()>;
    /// Workers with status `active`, ordered by last heartbeat (most recent
    /// first). Staleness filtering is applied by the caller at read time.
    async fn list_active(&self, cancel: &CancellationToken) -> Result<Vec<Worker>>;
    /// Atomically set `last_heartbeat` to `at`.
    async fn update_heartbeat(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
