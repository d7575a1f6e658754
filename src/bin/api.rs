//! API server process: REST routes, the WebSocket event stream, and
//! Prometheus metrics on one port.
//!
//! Runs the scheduler's progress loop in-process so manually triggered
//! runs advance when a worker shares the queue. Repositories default to
//! the in-memory implementations; swap in shared backends behind the same
//! ports for a multi-process deployment.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flowline::metrics::Collector;
use flowline::repository::memory::{
    MemoryTaskRepo, MemoryTaskRunRepo, MemoryWorkerRepo, MemoryWorkflowRepo,
    MemoryWorkflowRunRepo,
};
use flowline::web::{router, AppState};
use flowline::{Config, EventHub, Scheduler, Service, TaskQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowline::logging::init();
    let config = Config::from_env(8080)?;

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

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            scheduler.run_progress_loop(cancel).await;
        });
    }

    let state = AppState {
        service,
        hub,
        metrics,
        cancel: cancel.clone(),
        service_name: "flowline-api",
    };
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "api server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("api server stopped");
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
