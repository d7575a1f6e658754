//! Control-plane process: cron trigger loop, completion progress loop, and
//! a metrics/health endpoint.
//!
//! This wiring uses the in-memory queue and repositories, which are
//! process-local: tasks waiting in the queue are lost on restart, and
//! exactly one scheduler instance must run the cron trigger. In production,
//! swap in shared repository implementations behind the same ports.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flowline::metrics::Collector;
use flowline::repository::memory::{
    MemoryTaskRepo, MemoryTaskRunRepo, MemoryWorkerRepo, MemoryWorkflowRepo,
    MemoryWorkflowRunRepo,
};
use flowline::web::{observability_router, AppState};
use flowline::{Config, CronTrigger, EventHub, Scheduler, Service, TaskQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowline::logging::init();
    let config = Config::from_env(9090)?;

    let metrics = Arc::new(Collector::new()?);
    let hub = EventHub::default();
    let queue = Arc::new(TaskQueue::new());
    let workflows = Arc::new(MemoryWorkflowRepo::new());
    let tasks = Arc::new(MemoryTaskRepo::new());
    let workflow_runs = Arc::new(MemoryWorkflowRunRepo::new());
    let task_runs = Arc::new(MemoryTaskRunRepo::new());
    let workers = Arc::new(MemoryWorkerRepo::new());

    let scheduler = Arc::new(Scheduler::new(
        workflows.clone(),
        tasks.clone(),
        workflow_runs.clone(),
        task_runs.clone(),
        queue,
        hub.clone(),
        metrics.clone(),
    ));
    let service = Arc::new(Service::new(
        workflows,
        tasks,
        workflow_runs,
        task_runs,
        workers,
        scheduler.clone(),
        config.liveness_timeout,
    ));

    let cancel = CancellationToken::new();

    let state = AppState {
        service,
        hub,
        metrics,
        cancel: cancel.clone(),
        service_name: "flowline-scheduler",
    };
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
    info!(addr = %metrics_addr, "scheduler metrics server listening");
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

    info!("scheduler service started");
    let trigger = CronTrigger::new(scheduler.clone());
    tokio::join!(
        trigger.run(cancel.clone()),
        scheduler.run_progress_loop(cancel.clone()),
    );
    info!("scheduler service stopped");
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
