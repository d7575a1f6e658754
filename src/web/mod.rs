//! HTTP surface: REST routes, health and metrics endpoints, and the
//! WebSocket event stream.

pub mod handlers;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

/// Build the full API router. All dependencies are injected through
/// [`AppState`] so tests can mount the router over in-memory backends.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows", post(handlers::create_workflow))
        .route("/workflows", get(handlers::list_workflows))
        .route("/workflows/:id/trigger", post(handlers::trigger_workflow))
        .route("/workflow-runs", get(handlers::list_workflow_runs))
        .route("/task-runs", get(handlers::list_task_runs))
        .route("/workers", get(handlers::list_workers))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/ws/updates", get(ws::updates))
        .with_state(state)
}

/// Minimal router for the scheduler and worker processes: health and
/// metrics only.
pub fn observability_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
