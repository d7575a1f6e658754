//! Shared wiring for the end-to-end tests: in-memory backends, a scheduler
//! with its progress loop, and instrumented task handlers.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flowline::metrics::Collector;
use flowline::repository::memory::{
    MemoryTaskRepo, MemoryTaskRunRepo, MemoryWorkerRepo, MemoryWorkflowRepo,
    MemoryWorkflowRunRepo,
};
use flowline::models::Task;
use flowline::service::{CreateTaskInput, CreateWorkflowInput};
use flowline::worker::{no_backoff, TaskHandler};
use flowline::{EventHub, Scheduler, Service, TaskQueue, Worker};

pub const TEST_LIVENESS_TIMEOUT: Duration = Duration::from_millis(200);

pub struct TestEnv {
    pub workflows: Arc<MemoryWorkflowRepo>,
    pub tasks: Arc<MemoryTaskRepo>,
    pub workflow_runs: Arc<MemoryWorkflowRunRepo>,
    pub task_runs: Arc<MemoryTaskRunRepo>,
    pub workers: Arc<MemoryWorkerRepo>,
    pub queue: Arc<TaskQueue>,
    pub hub: EventHub,
    pub metrics: Arc<Collector>,
    pub scheduler: Arc<Scheduler>,
    pub service: Arc<Service>,
    pub cancel: CancellationToken,
}

impl TestEnv {
    pub fn new() -> Self {
        let workflows = Arc::new(MemoryWorkflowRepo::new());
        let tasks = Arc::new(MemoryTaskRepo::new());
        let workflow_runs = Arc::new(MemoryWorkflowRunRepo::new());
        let task_runs = Arc::new(MemoryTaskRunRepo::new());
        let workers = Arc::new(MemoryWorkerRepo::new());
        let queue = Arc::new(TaskQueue::new());
        let hub = EventHub::default();
        let metrics = Arc::new(Collector::default());
        let scheduler = Arc::new(Scheduler::new(
            workflows.clone(),
            tasks.clone(),
            workflow_runs.clone(),
            task_runs.clone(),
            queue.clone(),
            hub.clone(),
            metrics.clone(),
        ));
        let service = Arc::new(Service::new(
            workflows.clone(),
            tasks.clone(),
            workflow_runs.clone(),
            task_runs.clone(),
            workers.clone(),
            scheduler.clone(),
            TEST_LIVENESS_TIMEOUT,
        ));
        Self {
            workflows,
            tasks,
            workflow_runs,
            task_runs,
            workers,
            queue,
            hub,
            metrics,
            scheduler,
            service,
            cancel: CancellationToken::new(),
        }
    }

    /// Start the scheduler's completion progress loop in the background.
    pub fn spawn_progress_loop(&self) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            scheduler.run_progress_loop(cancel).await;
        })
    }

    /// Build a worker wired into this environment with a fast heartbeat and
    /// zero-delay backoff.
    pub fn worker(&self, handler: Arc<dyn TaskHandler>) -> Worker {
        Worker::new(
            "test-worker",
            self.queue.clone(),
            self.task_runs.clone(),
            self.workers.clone(),
            handler,
            self.hub.clone(),
            self.metrics.clone(),
            self.scheduler.completion_sender(),
        )
        .with_heartbeat_interval(Duration::from_millis(50))
        .with_backoff(Arc::new(no_backoff))
    }
}

pub fn workflow_input(name: &str, tasks: Vec<CreateTaskInput>) -> CreateWorkflowInput {
    CreateWorkflowInput {
        name: name.into(),
        description: String::new(),
        schedule_cron: String::new(),
        is_active: true,
        tasks,
    }
}

pub fn task_input(name: &str, depends_on: &[&str]) -> CreateTaskInput {
    CreateTaskInput {
        name: name.into(),
        command: format!("echo {name}"),
        retry_count: 0,
        retry_delay_seconds: 0,
        timeout_seconds: 0,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Handler that fails a fixed number of times, then succeeds.
pub struct FlakyHandler {
    failures_remaining: AtomicI32,
    pub calls: AtomicUsize,
}

impl FlakyHandler {
    pub fn new(failures: i32) -> Self {
        Self {
            failures_remaining: AtomicI32::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn execute(&self, _cancel: &CancellationToken, task: &Task) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            anyhow::bail!("transient failure running '{}'", task.name);
        }
        Ok(format!("ran {}", task.name))
    }
}

/// Handler that always fails.
pub struct FailingHandler {
    pub calls: AtomicUsize,
}

impl FailingHandler {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn execute(&self, _cancel: &CancellationToken, task: &Task) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("permanent failure running '{}'", task.name)
    }
}

/// Handler that sleeps for a fixed delay, honouring cancellation.
pub struct SlowHandler {
    pub delay: Duration,
}

#[async_trait]
impl TaskHandler for SlowHandler {
    async fn execute(&self, cancel: &CancellationToken, task: &Task) -> anyhow::Result<String> {
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("cancelled running '{}'", task.name),
            _ = tokio::time::sleep(self.delay) => Ok(format!("ran {}", task.name)),
        }
    }
}

/// Handler that records execution order by task name.
pub struct RecordingHandler {
    pub order: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn execute(&self, _cancel: &CancellationToken, task: &Task) -> anyhow::Result<String> {
        self.order.lock().unwrap().push(task.name.clone());
        Ok(format!("ran {}", task.name))
    }
}
