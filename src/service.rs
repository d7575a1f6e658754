//! Use-case layer consumed by the HTTP handlers.
//!
//! Thin mediation between the external API and the repositories plus the
//! scheduling engine. List operations always return a (possibly empty)
//! vector; pagination is sliced in-process because the repository list
//! operations return full result sets.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    RunStatus, Task, TaskDependency, TaskRun, TaskRunStatus, Worker, Workflow, WorkflowRun,
};
use crate::repository::{
    TaskRepository, TaskRunRepository, WorkerRepository, WorkflowRepository,
    WorkflowRunRepository,
};
use crate::scheduler::{cron, Scheduler};

/// Fields supplied by the caller when creating a workflow. Ids and
/// timestamps are generated here.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schedule_cron: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub tasks: Vec<CreateTaskInput>,
}

/// One task definition inside a workflow creation request. Dependencies
/// reference sibling tasks by name.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskInput {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub retry_count: i32,
    #[serde(default)]
    pub retry_delay_seconds: i32,
    #[serde(default)]
    pub timeout_seconds: i32,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Service holds the repository and scheduler dependencies and exposes the
/// use-case methods consumed by the HTTP layer.
pub struct Service {
    workflows: Arc<dyn WorkflowRepository>,
    tasks: Arc<dyn TaskRepository>,
    workflow_runs: Arc<dyn WorkflowRunRepository>,
    task_runs: Arc<dyn TaskRunRepository>,
    workers: Arc<dyn WorkerRepository>,
    scheduler: Arc<Scheduler>,
    liveness_timeout: Duration,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        tasks: Arc<dyn TaskRepository>,
        workflow_runs: Arc<dyn WorkflowRunRepository>,
        task_runs: Arc<dyn TaskRunRepository>,
        workers: Arc<dyn WorkerRepository>,
        scheduler: Arc<Scheduler>,
        liveness_timeout: Duration,
    ) -> Self {
        Self {
            workflows,
            tasks,
            workflow_runs,
            task_runs,
            workers,
            scheduler,
            liveness_timeout,
        }
    }

    /// Persist a new workflow with its tasks and dependency edges.
    pub async fn create_workflow(
        &self,
        cancel: &CancellationToken,
        input: CreateWorkflowInput,
    ) -> Result<Workflow> {
        let mut workflow = Workflow::new(input.name);
        workflow.description = input.description;
        workflow.schedule_cron = input.schedule_cron;
        workflow.is_active = input.is_active;
        workflow.validate()?;
        if !workflow.schedule_cron.is_empty() {
            cron::validate_cron(&workflow.schedule_cron)?;
        }

        // Resolve dependency names before persisting anything.
        let mut id_by_name: HashMap<String, Uuid> = HashMap::new();
        let mut tasks = Vec::with_capacity(input.tasks.len());
        for task_input in &input.tasks {
            let mut task = Task::new(workflow.id, task_input.name.clone(), task_input.command.clone());
            task.retry_count = task_input.retry_count;
            task.retry_delay_seconds = task_input.retry_delay_seconds;
            task.timeout_seconds = task_input.timeout_seconds;
            task.validate()?;
            if id_by_name.insert(task.name.clone(), task.id).is_some() {
                return Err(Error::invalid(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
            tasks.push(task);
        }

        let mut deps = Vec::new();
        for task_input in &input.tasks {
            let task_id = id_by_name[&task_input.name];
            for parent in &task_input.depends_on {
                let parent_id = *id_by_name.get(parent).ok_or_else(|| {
                    Error::invalid(format!(
                        "task '{}' depends on unknown task '{parent}'",
                        task_input.name
                    ))
                })?;
                deps.push(TaskDependency::new(task_id, parent_id));
            }
        }

        self.workflows.create(cancel, &workflow).await?;
        for task in &tasks {
            self.tasks.create(cancel, task).await?;
        }
        for dep in &deps {
            self.tasks.create_dependency(cancel, dep).await?;
        }

        info!(workflow_id = %workflow.id, name = %workflow.name,
            task_count = tasks.len(), "workflow created");
        Ok(workflow)
    }

    /// All workflows, newest first, with offset/limit slicing.
    pub async fn list_workflows(
        &self,
        cancel: &CancellationToken,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Workflow>> {
        let all = self.workflows.list(cancel).await?;
        Ok(paginate(all, offset, limit))
    }

    /// Create and expand a new run of the workflow. Emits a
    /// `workflow_status` event through the hub; `NotFound` surfaces when
    /// the workflow does not exist.
    pub async fn trigger_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<WorkflowRun> {
        self.scheduler.trigger_run(cancel, workflow_id).await
    }

    /// All workflow runs, optionally filtered by status.
    pub async fn list_workflow_runs(
        &self,
        cancel: &CancellationToken,
        status: Option<RunStatus>,
    ) -> Result<Vec<WorkflowRun>> {
        if let Some(status) = status {
            return self.workflow_runs.list_by_status(cancel, status).await;
        }
        let mut runs = Vec::new();
        for wf in self.workflows.list(cancel).await? {
            runs.extend(self.workflow_runs.list_by_workflow(cancel, wf.id).await?);
        }
        Ok(runs)
    }

    /// All task runs, optionally filtered by status.
    pub async fn list_task_runs(
        &self,
        cancel: &CancellationToken,
        status: Option<TaskRunStatus>,
    ) -> Result<Vec<TaskRun>> {
        if let Some(status) = status {
            return self.task_runs.list_by_status(cancel, status).await;
        }
        let mut out = Vec::new();
        for run in self.list_workflow_runs(cancel, None).await? {
            out.extend(
                self.task_runs
                    .list_by_workflow_run(cancel, run.id)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Active workers whose heartbeat is within the liveness window.
    /// Staleness is filtered here, at read time; rows of dead workers stay
    /// in the store but disappear from this listing.
    pub async fn list_workers(&self, cancel: &CancellationToken) -> Result<Vec<Worker>> {
        let mut workers = self.workers.list_active(cancel).await?;
        workers.retain(|w| w.is_alive(self.liveness_timeout));
        Ok(workers)
    }
}

/// Apply offset/limit slicing; a zero limit means all remaining items.
fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let mut items: Vec<T> = items.into_iter().skip(offset).collect();
    if limit > 0 && items.len() > limit {
        items.truncate(limit);
    }
    items
}
