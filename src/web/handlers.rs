//! REST handlers. Each delegates to the service layer and maps the error
//! taxonomy onto HTTP statuses: not-found → 404, invalid-input → 400 with
//! the violated rule, cancelled → 499, everything else → 500 with a short
//! error string.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

use super::state::AppState;
use crate::error::Error;
use crate::models::{RunStatus, TaskRunStatus};
use crate::service::CreateWorkflowInput;

/// Wrapper turning core errors into HTTP responses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            // Client closed request; the de-facto status for cancellation.
            Error::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Error::QueueEmpty | Error::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

/// POST /workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(input): Json<CreateWorkflowInput>,
) -> ApiResult<impl IntoResponse> {
    let workflow = state.service.create_workflow(&state.cancel, input).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /workflows?offset=&limit=
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let workflows = state
        .service
        .list_workflows(&state.cancel, page.offset, page.limit)
        .await?;
    Ok(Json(workflows))
}

/// POST /workflows/:id/trigger
pub async fn trigger_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let run = state.service.trigger_workflow(&state.cancel, id).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /workflow-runs?status=
pub async fn list_workflow_runs(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(RunStatus::from_str)
        .transpose()
        .map_err(Error::invalid)?;
    let runs = state
        .service
        .list_workflow_runs(&state.cancel, status)
        .await?;
    Ok(Json(runs))
}

/// GET /task-runs?status=
pub async fn list_task_runs(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(TaskRunStatus::from_str)
        .transpose()
        .map_err(Error::invalid)?;
    let runs = state.service.list_task_runs(&state.cancel, status).await?;
    Ok(Json(runs))
}

/// GET /workers
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let workers = state.service.list_workers(&state.cancel).await?;
    Ok(Json(workers))
}

/// GET /healthz
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": state.service_name }))
}

/// GET /metrics in the Prometheus text exposition format.
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
