//! Worker runtime.
//!
//! A worker registers itself, then runs two loops until the ambient
//! cancellation fires: the execution loop (dequeue → execute → persist) and
//! the heartbeat loop. Task execution owns the retry state machine: a
//! failing handler moves the run through `retrying` and back onto the queue
//! until the retry budget is exhausted.

pub mod backoff;
pub mod handler;

pub use backoff::{default_backoff, no_backoff, BackoffFn};
pub use handler::{MockHandler, ShellHandler, TaskHandler};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::events::{Event, EventHub};
use crate::metrics::Collector;
use crate::models::{TaskRunStatus, Worker as WorkerRecord, WorkerStatus};
use crate::queue::{QueuedTask, TaskQueue};
use crate::repository::{TaskRunRepository, WorkerRepository};
use crate::scheduler::TaskRunCompletion;

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Dequeues task runs and executes them via the pluggable handler, managing
/// status transitions, retries with backoff, and heartbeats.
pub struct Worker {
    record: WorkerRecord,
    queue: Arc<TaskQueue>,
    task_runs: Arc<dyn TaskRunRepository>,
    workers: Arc<dyn WorkerRepository>,
    handler: Arc<dyn TaskHandler>,
    hub: EventHub,
    metrics: Arc<Collector>,
    completions: mpsc::UnboundedSender<TaskRunCompletion>,
    heartbeat_interval: Duration,
    backoff: BackoffFn,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<TaskQueue>,
        task_runs: Arc<dyn TaskRunRepository>,
        workers: Arc<dyn WorkerRepository>,
        handler: Arc<dyn TaskHandler>,
        hub: EventHub,
        metrics: Arc<Collector>,
        completions: mpsc::UnboundedSender<TaskRunCompletion>,
    ) -> Self {
        Self {
            record: WorkerRecord::new(worker_id),
            queue,
            task_runs,
            workers,
            handler,
            hub,
            metrics,
            completions,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            backoff: Arc::new(default_backoff),
        }
    }

    /// Set the interval between heartbeat writes. The default is 15 seconds.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the backoff function used before each retry. The default is
    /// exponential, capped at 30 seconds.
    pub fn with_backoff(mut self, backoff: BackoffFn) -> Self {
        self.backoff = backoff;
        self
    }

    /// Id of this worker's registration row.
    pub fn id(&self) -> uuid::Uuid {
        self.record.id
    }

    /// Register the worker, then process tasks and heartbeats until
    /// `cancel` fires. Always returns `Ok(())` on cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.record.validate()?;
        self.workers.create(&cancel, &self.record).await?;
        info!(worker_id = %self.record.hostname, "worker registered");

        let (process, _) = tokio::join!(
            self.process_loop(&cancel),
            self.heartbeat_loop(&cancel),
        );

        // Best-effort deregistration; the row may already be gone.
        let mut record = self.record.clone();
        record.status = WorkerStatus::Inactive;
        let detached = CancellationToken::new();
        if let Err(err) = self.workers.update(&detached, &record).await {
            debug!(worker_id = %self.record.hostname, error = %err, "deregistration skipped");
        }
        info!(worker_id = %self.record.hostname, "worker stopped");
        process
    }

    async fn process_loop(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            match self.queue.dequeue(cancel).await {
                Ok(item) => self.execute(cancel, item).await,
                Err(Error::QueueEmpty) => {
                    // Cancellation fired while blocked; clean shutdown.
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run a single task, handling status transitions and retry logic.
    ///
    /// Repository writes use a detached token: once execution has started,
    /// the run must reach a persisted terminal (or `retrying`) state even if
    /// the ambient cancellation fires mid-flight. Only the handler itself
    /// observes the ambient token.
    async fn execute(&self, cancel: &CancellationToken, item: QueuedTask) {
        let persist = CancellationToken::new();
        let task = &item.task;
        let mut run = match self.task_runs.get_by_id(&persist, item.task_run_id).await {
            Ok(run) => run,
            Err(err) => {
                warn!(task_run_id = %item.task_run_id, error = %err, "dequeued unknown task run");
                return;
            }
        };
        if run.status.is_terminal() {
            // Cancelled while waiting in the queue; never transition a
            // terminal run.
            debug!(task_run_id = %run.id, status = %run.status, "skipping settled task run");
            return;
        }

        run.status = TaskRunStatus::Running;
        run.started_at = Utc::now();
        if let Err(err) = self.task_runs.update(&persist, &run).await {
            error!(task_run_id = %run.id, error = %err, "failed to mark task run running");
            return;
        }
        self.hub.broadcast(cancel, &Event::task_status(&run));
        debug!(task_run_id = %run.id, task = %task.name, attempt = run.attempt, "executing task");

        let started = std::time::Instant::now();
        let outcome = self.invoke_handler(cancel, task).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(output) => {
                run.append_log(&output);
                run.status = TaskRunStatus::Success;
                run.finished_at = Some(Utc::now());
                if let Err(err) = self.task_runs.update(&persist, &run).await {
                    error!(task_run_id = %run.id, error = %err, "failed to persist task success");
                    return;
                }
                self.metrics
                    .tasks_total
                    .with_label_values(&["success"])
                    .inc();
                self.metrics
                    .task_duration_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
                self.hub.broadcast(cancel, &Event::task_status(&run));
                self.report_completion(&run);
                info!(task_run_id = %run.id, task = %task.name, "task succeeded");
            }
            Err(err) => {
                run.append_log(&format!("attempt {}: {err}", run.attempt));
                if task.can_retry(run.attempt) {
                    self.retry(cancel, item.clone(), run).await;
                } else {
                    run.status = TaskRunStatus::Failed;
                    run.finished_at = Some(Utc::now());
                    if let Err(err) = self.task_runs.update(&persist, &run).await {
                        error!(task_run_id = %run.id, error = %err, "failed to persist task failure");
                        return;
                    }
                    self.metrics
                        .tasks_total
                        .with_label_values(&["failed"])
                        .inc();
                    self.metrics
                        .task_duration_seconds
                        .with_label_values(&["failed"])
                        .observe(elapsed);
                    self.hub.broadcast(cancel, &Event::task_status(&run));
                    self.report_completion(&run);
                    warn!(task_run_id = %run.id, task = %task.name, attempt = run.attempt,
                        error = %err, "task failed, retries exhausted");
                }
            }
        }
    }

    /// Execute the handler under a child cancellation that also enforces the
    /// task's timeout (0 = no timeout).
    async fn invoke_handler(
        &self,
        cancel: &CancellationToken,
        task: &crate::models::Task,
    ) -> anyhow::Result<String> {
        let child = cancel.child_token();
        if task.timeout_seconds > 0 {
            let limit = Duration::from_secs(task.timeout_seconds as u64);
            match tokio::time::timeout(limit, self.handler.execute(&child, task)).await {
                Ok(result) => result,
                Err(_) => {
                    child.cancel();
                    anyhow::bail!("task timed out after {}s", task.timeout_seconds)
                }
            }
        } else {
            self.handler.execute(&child, task).await
        }
    }

    /// Persist the `retrying` state, wait out the backoff (honouring
    /// cancellation), then bump the attempt and put the task back on the
    /// queue.
    async fn retry(
        &self,
        cancel: &CancellationToken,
        item: QueuedTask,
        mut run: crate::models::TaskRun,
    ) {
        self.metrics
            .task_retries_total
            .with_label_values(&[self.record.hostname.as_str()])
            .inc();

        let persist = CancellationToken::new();
        run.status = TaskRunStatus::Retrying;
        if let Err(err) = self.task_runs.update(&persist, &run).await {
            error!(task_run_id = %run.id, error = %err, "failed to persist retrying state");
            return;
        }
        self.hub.broadcast(cancel, &Event::task_status(&run));

        let delay = (self.backoff)((run.attempt - 1).max(0) as u32);
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Shutting down mid-backoff; the run stays `retrying` and
                    // is picked up again when resubmitted (at-least-once).
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        run.attempt += 1;
        run.status = TaskRunStatus::Queued;
        if let Err(err) = self.task_runs.update(&persist, &run).await {
            error!(task_run_id = %run.id, error = %err, "failed to requeue task run");
            return;
        }
        self.hub.broadcast(cancel, &Event::task_status(&run));
        self.queue.enqueue(item);
        debug!(task_run_id = %run.id, attempt = run.attempt, "task requeued for retry");
    }

    fn report_completion(&self, run: &crate::models::TaskRun) {
        // The receiver is absent in worker-only deployments; that is fine.
        let _ = self.completions.send(TaskRunCompletion {
            workflow_run_id: run.workflow_run_id,
            task_run_id: run.id,
            task_id: run.task_id,
            status: run.status,
        });
    }

    /// Update the registration row's heartbeat at the configured interval
    /// until `cancel` fires. Transient repository errors are logged and
    /// ignored.
    async fn heartbeat_loop(&self, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; skip it so
        // the first write lands one interval after registration.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            match self.workers.update_heartbeat(cancel, self.record.id, now).await {
                Ok(()) => {
                    self.metrics
                        .worker_heartbeats_total
                        .with_label_values(&[self.record.hostname.as_str()])
                        .inc();
                    let mut record = self.record.clone();
                    record.last_heartbeat = now;
                    self.hub.broadcast(cancel, &Event::worker_heartbeat(&record));
                }
                Err(Error::Cancelled) => return,
                Err(err) => {
                    warn!(worker_id = %self.record.hostname, error = %err, "heartbeat update failed");
                }
            }
        }
    }
}
