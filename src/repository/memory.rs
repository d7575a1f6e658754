//! In-memory repository implementations.
//!
//! The default storage backend and the one used in tests. Each aggregate is
//! guarded by its own `RwLock`; values are cloned on the way in and out so
//! returned entities are independent of stored state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    TaskRepository, TaskRunRepository, WorkerRepository, WorkflowRepository,
    WorkflowRunRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    RunStatus, Task, TaskDependency, TaskRun, TaskRunStatus, Worker, WorkerStatus, Workflow,
    WorkflowRun,
};

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// In-memory [`WorkflowRepository`].
#[derive(Default)]
pub struct MemoryWorkflowRepo {
    store: RwLock<HashMap<Uuid, Workflow>>,
}

impl MemoryWorkflowRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepo {
    async fn create(&self, cancel: &CancellationToken, wf: &Workflow) -> Result<()> {
        ensure_live(cancel)?;
        self.store.write().await.insert(wf.id, wf.clone());
        Ok(())
    }

    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<Workflow> {
        ensure_live(cancel)?;
        self.store
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("workflow"))
    }

    async fn update(&self, cancel: &CancellationToken, wf: &Workflow) -> Result<()> {
        ensure_live(cancel)?;
        let mut store = self.store.write().await;
        if !store.contains_key(&wf.id) {
            return Err(Error::NotFound("workflow"));
        }
        store.insert(wf.id, wf.clone());
        Ok(())
    }

    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<()> {
        ensure_live(cancel)?;
        self.store
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("workflow"))
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Workflow>> {
        ensure_live(cancel)?;
        let mut out: Vec<Workflow> = self.store.read().await.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_active(&self, cancel: &CancellationToken) -> Result<Vec<Workflow>> {
        let mut out = self.list(cancel).await?;
        out.retain(|wf| wf.is_active);
        Ok(out)
    }
}

/// In-memory [`TaskRepository`]. Tasks and their dependency edges share the
/// repository because both are written together at workflow creation.
#[derive(Default)]
pub struct MemoryTaskRepo {
    tasks: RwLock<HashMap<Uuid, Task>>,
    deps: RwLock<HashMap<Uuid, TaskDependency>>,
}

impl MemoryTaskRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepo {
    async fn create(&self, cancel: &CancellationToken, task: &Task) -> Result<()> {
        ensure_live(cancel)?;
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<Task> {
        ensure_live(cancel)?;
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("task"))
    }

    async fn update(&self, cancel: &CancellationToken, task: &Task) -> Result<()> {
        ensure_live(cancel)?;
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.id) {
            return Err(Error::NotFound("task"));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<()> {
        ensure_live(cancel)?;
        self.tasks
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("task"))
    }

    async fn list_by_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<Vec<Task>> {
        ensure_live(cancel)?;
        let mut out: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn create_dependency(
        &self,
        cancel: &CancellationToken,
        dep: &TaskDependency,
    ) -> Result<()> {
        ensure_live(cancel)?;
        self.deps.write().await.insert(dep.id, dep.clone());
        Ok(())
    }

    async fn list_dependencies(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<Vec<TaskDependency>> {
        ensure_live(cancel)?;
        let task_ids: Vec<Uuid> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.workflow_id == workflow_id)
                .map(|t| t.id)
                .collect()
        };
        let deps = self.deps.read().await;
        Ok(deps
            .values()
            .filter(|d| task_ids.contains(&d.task_id))
            .cloned()
            .collect())
    }
}

/// In-memory [`WorkflowRunRepository`].
#[derive(Default)]
pub struct MemoryWorkflowRunRepo {
    store: RwLock<HashMap<Uuid, WorkflowRun>>,
}

impl MemoryWorkflowRunRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRunRepository for MemoryWorkflowRunRepo {
    async fn create(&self, cancel: &CancellationToken, run: &WorkflowRun) -> Result<()> {
        ensure_live(cancel)?;
        self.store.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<WorkflowRun> {
        ensure_live(cancel)?;
        self.store
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("workflow run"))
    }

    async fn update_status(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        ensure_live(cancel)?;
        let mut store = self.store.write().await;
        let run = store.get_mut(&id).ok_or(Error::NotFound("workflow run"))?;
        run.status = status;
        run.finished_at = finished_at;
        Ok(())
    }

    async fn list_by_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowRun>> {
        ensure_live(cancel)?;
        let mut out: Vec<WorkflowRun> = self
            .store
            .read()
            .await
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(out)
    }

    async fn list_by_status(
        &self,
        cancel: &CancellationToken,
        status: RunStatus,
    ) -> Result<Vec<WorkflowRun>> {
        ensure_live(cancel)?;
        let mut out: Vec<WorkflowRun> = self
            .store
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(out)
    }
}

/// In-memory [`TaskRunRepository`].
#[derive(Default)]
pub struct MemoryTaskRunRepo {
    store: RwLock<HashMap<Uuid, TaskRun>>,
}

impl MemoryTaskRunRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRunRepository for MemoryTaskRunRepo {
    async fn create(&self, cancel: &CancellationToken, run: &TaskRun) -> Result<()> {
        ensure_live(cancel)?;
        self.store.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<TaskRun> {
        ensure_live(cancel)?;
        self.store
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("task run"))
    }

    async fn update(&self, cancel: &CancellationToken, run: &TaskRun) -> Result<()> {
        ensure_live(cancel)?;
        let mut store = self.store.write().await;
        if !store.contains_key(&run.id) {
            return Err(Error::NotFound("task run"));
        }
        store.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        status: TaskRunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        ensure_live(cancel)?;
        let mut store = self.store.write().await;
        let run = store.get_mut(&id).ok_or(Error::NotFound("task run"))?;
        run.status = status;
        run.finished_at = finished_at;
        Ok(())
    }

    async fn list_by_workflow_run(
        &self,
        cancel: &CancellationToken,
        workflow_run_id: Uuid,
    ) -> Result<Vec<TaskRun>> {
        ensure_live(cancel)?;
        Ok(self
            .store
            .read()
            .await
            .values()
            .filter(|r| r.workflow_run_id == workflow_run_id)
            .cloned()
            .collect())
    }

    async fn list_by_task(
        &self,
        cancel: &CancellationToken,
        task_id: Uuid,
    ) -> Result<Vec<TaskRun>> {
        ensure_live(cancel)?;
        Ok(self
            .store
            .read()
            .await
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(
        &self,
        cancel: &CancellationToken,
        status: TaskRunStatus,
    ) -> Result<Vec<TaskRun>> {
        ensure_live(cancel)?;
        Ok(self
            .store
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }
}

/// In-memory [`WorkerRepository`].
#[derive(Default)]
pub struct MemoryWorkerRepo {
    store: RwLock<HashMap<Uuid, Worker>>,
}

impl MemoryWorkerRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRepository for MemoryWorkerRepo {
    async fn create(&self, cancel: &CancellationToken, worker: &Worker) -> Result<()> {
        ensure_live(cancel)?;
        self.store.write().await.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn get_by_id(&self, cancel: &CancellationToken, id: Uuid) -> Result<Worker> {
        ensure_live(cancel)?;
        self.store
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("worker"))
    }

    async fn update(&self, cancel: &CancellationToken, worker: &Worker) -> Result<()> {
        ensure_live(cancel)?;
        let mut store = self.store.write().await;
        if !store.contains_key(&worker.id) {
            return Err(Error::NotFound("worker"));
        }
        store.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<()> {
        ensure_live(cancel)?;
        self.store
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("worker"))
    }

    async fn list_active(&self, cancel: &CancellationToken) -> Result<Vec<Worker>> {
        ensure_live(cancel)?;
        let mut out: Vec<Worker> = self
            .store
            .read()
            .await
            .values()
            .filter(|w| w.status == WorkerStatus::Active)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_heartbeat.cmp(&a.last_heartbeat));
        Ok(out)
    }

    async fn update_heartbeat(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        ensure_live(cancel)?;
        let mut store = self.store.write().await;
        let worker = store.get_mut(&id).ok_or(Error::NotFound("worker"))?;
        worker.last_heartbeat = at;
        Ok(())
    }
}
