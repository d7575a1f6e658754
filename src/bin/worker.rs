//! Worker process: registers, dequeues, executes, heartbeats, and exposes
//! its own metrics/health endpoint.
//!
//! This wiring uses the in-memory queue and repositories, which are
//! process-local; point the worker at shared implementations of the same
//! ports to scale the pool horizontally.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flowline::metrics::Collector;
use flowline::repository::memory::{
    MemoryTaskRepo, MemoryTaskRunRepo, MemoryWorkerRepo, MemoryWorkflowRepo,
    MemoryWorkflowRunRepo,
};
use flowline::web::{observability_router, AppState};
use flowline::worker::MockHandler;
use flowline::{Config, EventHub, Scheduler, Service, TaskQueue, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowline::logging::init();
    let config = Config::from_env(9091)?;

    let metrics = Arc::new(Collector::new()?);
    let hub = EventHub::default();
    let queue = Arc::new(TaskQueue::new());
    let workflows = Arc::new(MemoryWorkflowRepo::new());
    let tasks = Arc::new(MemoryTaskRepo::new());
    let workflow_runs = Arc::new(MemoryWorkflowRunRepo::new());
    let task_runs = Arc::new(MemoryTaskRunRepo::new());
    let workers = Arc::new(MemoryWorkerRepo::new());

    // Completions are consumed by a scheduler's progress loop when one runs
    // in-process; standalone workers just drop them.
    let (completions_tx, _completions_rx) = mpsc::unbounded_channel();

    // Swap in `ShellHandler` to execute task commands for real.
    let worker = Worker::new(
        config.worker_id.clone(),
        queue,
        task_runs.clone(),
        workers.clone(),
        Arc::new(MockHandler),
        hub.clone(),
        metrics.clone(),
        completions_tx,
    )
    .with_heartbeat_interval(config.heartbeat_interval);

    let cancel = CancellationToken::new();

    let scheduler = Arc::new(Scheduler::new(
        workflows.clone(),
        tasks.clone(),
        workflow_runs.clone(),
        task_runs.clone(),
        Arc::new(TaskQueue::new()),
        hub.clone(),
        metrics.clone(),
    ));
    let service = Arc::new(Service::new(
        workflows,
        tasks,
        workflow_runs,
        task_runs,
        workers,
        scheduler,
        config.liveness_timeout,
    ));

    let state = AppState {
        service,
        hub,
        metrics,
        cancel: cancel.clone(),
        service_name: "flowline-worker",
    };
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
    info!(addr = %metrics_addr, "worker metrics server listening");
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, observability_router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
    });

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    info!(worker_id = %config.worker_id, "worker starting");
    worker.run(cancel).await?;
    info!(worker_id = %config.worker_id, "worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
