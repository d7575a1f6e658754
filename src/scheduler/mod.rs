//! Scheduling engine.
//!
//! Owns run instantiation (manual triggers and cron ticks), DAG-ordered
//! task submission, cancellation, and workflow-run finalization. Workers
//! report terminal task-run transitions over the completion channel; the
//! progress loop consumes them, unlocks downstream tasks, and settles the
//! run once every task run is terminal.

pub mod cron;
pub mod dag;

pub use cron::CronTrigger;
pub use dag::DependencyGraph;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{Event, EventHub};
use crate::metrics::Collector;
use crate::models::{RunStatus, Task, TaskRun, TaskRunStatus, WorkflowRun};
use crate::queue::{QueuedTask, TaskQueue};
use crate::repository::{
    TaskRepository, TaskRunRepository, WorkflowRepository, WorkflowRunRepository,
};

/// Terminal task-run transition reported by a worker.
#[derive(Debug, Clone)]
pub struct TaskRunCompletion {
    pub workflow_run_id: Uuid,
    pub task_run_id: Uuid,
    pub task_id: Uuid,
    pub status: TaskRunStatus,
}

/// The scheduling engine. Shared behind an `Arc` by the cron trigger, the
/// service facade, and the progress loop.
pub struct Scheduler {
    workflows: Arc<dyn WorkflowRepository>,
    tasks: Arc<dyn TaskRepository>,
    workflow_runs: Arc<dyn WorkflowRunRepository>,
    task_runs: Arc<dyn TaskRunRepository>,
    queue: Arc<TaskQueue>,
    hub: EventHub,
    metrics: Arc<Collector>,
    completions_tx: mpsc::UnboundedSender<TaskRunCompletion>,
    completions_rx: StdMutex<Option<mpsc::UnboundedReceiver<TaskRunCompletion>>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        tasks: Arc<dyn TaskRepository>,
        workflow_runs: Arc<dyn WorkflowRunRepository>,
        task_runs: Arc<dyn TaskRunRepository>,
        queue: Arc<TaskQueue>,
        hub: EventHub,
        metrics: Arc<Collector>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            workflows,
            tasks,
            workflow_runs,
            task_runs,
            queue,
            hub,
            metrics,
            completions_tx,
            completions_rx: StdMutex::new(Some(completions_rx)),
        }
    }

    /// Sender handed to workers so they can report terminal transitions.
    pub fn completion_sender(&self) -> mpsc::UnboundedSender<TaskRunCompletion> {
        self.completions_tx.clone()
    }

    pub fn workflows(&self) -> &Arc<dyn WorkflowRepository> {
        &self.workflows
    }

    /// Validate the task, move its run to `queued`, persist, and enqueue.
    /// Does not block on worker availability.
    pub async fn submit(&self, cancel: &CancellationToken, item: QueuedTask) -> Result<()> {
        item.task.validate()?;

        let mut run = self.task_runs.get_by_id(cancel, item.task_run_id).await?;
        if run.status.is_terminal() {
            // Cancelled (or otherwise settled) before it ever reached the
            // queue; nothing to dispatch.
            return Ok(());
        }
        run.status = TaskRunStatus::Queued;
        self.task_runs
            .update_status(cancel, run.id, TaskRunStatus::Queued, None)
            .await?;
        self.hub.broadcast(cancel, &Event::task_status(&run));
        self.queue.enqueue(item);
        Ok(())
    }

    /// Mark the task run failed unless it already reached a terminal state;
    /// cancelling a terminal run is a no-op. An in-flight execution is not
    /// revoked: the worker observes the terminal row after it finishes.
    pub async fn cancel(&self, cancel: &CancellationToken, task_run_id: Uuid) -> Result<()> {
        let run = self.task_runs.get_by_id(cancel, task_run_id).await?;
        if run.status.is_terminal() {
            return Ok(());
        }
        let now = Utc::now();
        self.task_runs
            .update_status(cancel, task_run_id, TaskRunStatus::Failed, Some(now))
            .await?;
        let mut cancelled = run;
        cancelled.status = TaskRunStatus::Failed;
        cancelled.finished_at = Some(now);
        self.hub.broadcast(cancel, &Event::task_status(&cancelled));
        info!(task_run_id = %task_run_id, "task run cancelled");
        Ok(())
    }

    /// Current status of a task run; `NotFound` surfaces unchanged.
    pub async fn status(
        &self,
        cancel: &CancellationToken,
        task_run_id: Uuid,
    ) -> Result<TaskRunStatus> {
        let run = self.task_runs.get_by_id(cancel, task_run_id).await?;
        Ok(run.status)
    }

    /// Instantiate a run of the workflow: create the run row, expand it into
    /// task runs, and submit the initially-runnable set. A cyclic dependency
    /// graph fails the run before anything is enqueued.
    pub async fn trigger_run(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
    ) -> Result<WorkflowRun> {
        let workflow = self.workflows.get_by_id(cancel, workflow_id).await?;

        let mut run = WorkflowRun::new(workflow.id);
        self.workflow_runs.create(cancel, &run).await?;
        self.metrics
            .workflows_total
            .with_label_values(&["pending"])
            .inc();

        let tasks = self.tasks.list_by_workflow(cancel, workflow.id).await?;
        let deps = self.tasks.list_dependencies(cancel, workflow.id).await?;

        if tasks.is_empty() {
            // Nothing to execute; the run settles immediately.
            let now = Utc::now();
            self.workflow_runs
                .update_status(cancel, run.id, RunStatus::Success, Some(now))
                .await?;
            run.status = RunStatus::Success;
            run.finished_at = Some(now);
            self.metrics.workflow_successes_total.inc();
            self.hub.broadcast(cancel, &Event::workflow_status(&run));
            return Ok(run);
        }

        let graph = DependencyGraph::new(&tasks, &deps);
        if let Err(err) = graph.ensure_acyclic() {
            let now = Utc::now();
            self.workflow_runs
                .update_status(cancel, run.id, RunStatus::Failed, Some(now))
                .await?;
            run.status = RunStatus::Failed;
            run.finished_at = Some(now);
            self.metrics.workflow_failures_total.inc();
            self.hub.broadcast(cancel, &Event::workflow_status(&run));
            warn!(workflow_id = %workflow.id, workflow_run_id = %run.id, error = %err,
                "workflow run rejected");
            return Err(err);
        }

        // Create a row per task up-front so cascade failure and
        // finalization always see the whole run.
        let mut run_by_task: HashMap<Uuid, TaskRun> = HashMap::new();
        for task in &tasks {
            let task_run = TaskRun::new(run.id, task.id);
            self.task_runs.create(cancel, &task_run).await?;
            run_by_task.insert(task.id, task_run);
        }

        let task_by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
        for task_id in graph.roots() {
            let task = task_by_id[&task_id];
            let task_run = &run_by_task[&task_id];
            self.submit(
                cancel,
                QueuedTask {
                    task_run_id: task_run.id,
                    workflow_run_id: run.id,
                    task: (*task).clone(),
                },
            )
            .await?;
        }

        self.hub.broadcast(cancel, &Event::workflow_status(&run));
        info!(workflow_id = %workflow.id, workflow_run_id = %run.id,
            task_count = tasks.len(), "workflow run created");
        Ok(run)
    }

    /// Consume worker completions until `cancel` fires. Call at most once
    /// per scheduler instance.
    pub async fn run_progress_loop(&self, cancel: CancellationToken) {
        let rx = self
            .completions_rx
            .lock()
            .expect("completion receiver mutex poisoned")
            .take();
        let Some(mut rx) = rx else {
            warn!("progress loop already running, refusing second start");
            return;
        };

        info!("scheduler progress loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(completion) => {
                        if let Err(err) = self.handle_completion(&cancel, &completion).await {
                            match err {
                                Error::Cancelled => break,
                                err => error!(
                                    workflow_run_id = %completion.workflow_run_id,
                                    task_run_id = %completion.task_run_id,
                                    error = %err,
                                    "failed to process task completion"
                                ),
                            }
                        }
                    }
                    None => break,
                }
            }
        }
        info!("scheduler progress loop stopped");
    }

    /// Advance one workflow run after a terminal task-run transition.
    async fn handle_completion(
        &self,
        cancel: &CancellationToken,
        completion: &TaskRunCompletion,
    ) -> Result<()> {
        let run = self
            .workflow_runs
            .get_by_id(cancel, completion.workflow_run_id)
            .await?;
        if run.is_terminal() {
            debug!(workflow_run_id = %run.id, "completion for settled run ignored");
            return Ok(());
        }

        let tasks = self.tasks.list_by_workflow(cancel, run.workflow_id).await?;
        let deps = self.tasks.list_dependencies(cancel, run.workflow_id).await?;
        let graph = DependencyGraph::new(&tasks, &deps);

        let task_runs = self
            .task_runs
            .list_by_workflow_run(cancel, run.id)
            .await?;
        let run_by_task: HashMap<Uuid, &TaskRun> =
            task_runs.iter().map(|tr| (tr.task_id, tr)).collect();
        let statuses: HashMap<Uuid, TaskRunStatus> =
            task_runs.iter().map(|tr| (tr.task_id, tr.status)).collect();
        let task_by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.id, t)).collect();

        match completion.status {
            TaskRunStatus::Success => {
                for task_id in graph.unblocked_by(completion.task_id, &statuses) {
                    let Some(task_run) = run_by_task.get(&task_id) else {
                        continue;
                    };
                    if task_run.status != TaskRunStatus::Pending {
                        continue;
                    }
                    let task = task_by_id[&task_id];
                    self.submit(
                        cancel,
                        QueuedTask {
                            task_run_id: task_run.id,
                            workflow_run_id: run.id,
                            task: task.clone(),
                        },
                    )
                    .await?;
                }
            }
            TaskRunStatus::Failed => {
                // Everything downstream of a failure can never become
                // runnable; fail it without enqueueing.
                let now = Utc::now();
                for task_id in graph.transitive_downstream(completion.task_id) {
                    let Some(task_run) = run_by_task.get(&task_id) else {
                        continue;
                    };
                    if task_run.status.is_terminal() {
                        continue;
                    }
                    self.task_runs
                        .update_status(cancel, task_run.id, TaskRunStatus::Failed, Some(now))
                        .await?;
                    let mut failed = (*task_run).clone();
                    failed.status = TaskRunStatus::Failed;
                    failed.finished_at = Some(now);
                    self.hub.broadcast(cancel, &Event::task_status(&failed));
                }
            }
            other => {
                warn!(task_run_id = %completion.task_run_id, status = %other,
                    "ignoring non-terminal completion report");
                return Ok(());
            }
        }

        self.finalize_run(cancel, &run).await
    }

    /// Settle the run if every task run is terminal, or mark it running if
    /// it is still pending with work in flight.
    async fn finalize_run(&self, cancel: &CancellationToken, run: &WorkflowRun) -> Result<()> {
        let task_runs = self
            .task_runs
            .list_by_workflow_run(cancel, run.id)
            .await?;

        if task_runs.iter().all(TaskRun::is_terminal) {
            let all_succeeded = task_runs
                .iter()
                .all(|tr| tr.status == TaskRunStatus::Success);
            let status = if all_succeeded {
                RunStatus::Success
            } else {
                RunStatus::Failed
            };
            let now = Utc::now();
            self.workflow_runs
                .update_status(cancel, run.id, status, Some(now))
                .await?;

            self.metrics
                .workflows_total
                .with_label_values(&[&status.to_string()])
                .inc();
            if all_succeeded {
                self.metrics.workflow_successes_total.inc();
            } else {
                self.metrics.workflow_failures_total.inc();
            }

            let mut settled = run.clone();
            settled.status = status;
            settled.finished_at = Some(now);
            self.hub.broadcast(cancel, &Event::workflow_status(&settled));
            info!(workflow_run_id = %run.id, status = %status, "workflow run settled");
        } else if run.status == RunStatus::Pending {
            self.workflow_runs
                .update_status(cancel, run.id, RunStatus::Running, None)
                .await?;
            let mut running = run.clone();
            running.status = RunStatus::Running;
            self.hub.broadcast(cancel, &Event::workflow_status(&running));
        }
        Ok(())
    }
}
