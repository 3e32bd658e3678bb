//! Task completion and progress.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use std::sync::Arc;

use super::error::{body, path_id, ApiError};
use super::{session, AppState};
use crate::protocol::{
    TaskCompleteRequest, TaskCompleteResponse, TaskProgressRequest, TaskProgressResponse,
};

/// `POST /api/user/{id}/tasks/complete`, by `taskId`, or by `taskType` for
/// one-off tasks that have no row yet.
pub(super) async fn handler_tasks_complete(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<TaskCompleteRequest>, JsonRejection>,
) -> Result<Json<TaskCompleteResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::complete_task(&state, id, req).await?))
}

/// `POST /api/user/{id}/tasks/progress`. `progress` is a delta.
pub(super) async fn handler_tasks_progress(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<TaskProgressRequest>, JsonRejection>,
) -> Result<Json<TaskProgressResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::advance_task(&state, id, req).await?))
}
