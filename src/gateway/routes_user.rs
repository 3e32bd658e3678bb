//! Account snapshot, points and wallet endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use std::sync::Arc;

use super::error::{body, path_id, ApiError};
use super::{session, AppState};
use crate::protocol::{
    AuthResponse, AwardPointsRequest, PointsResponse, WalletRequest, WalletResponse,
};

/// `GET /api/user/{id}`: prunes expired boosts, then returns the snapshot.
pub(super) async fn handler_user_get(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = session::snapshot(&state, path_id(id)?).await?;
    Ok(Json(AuthResponse {
        success: true,
        user,
    }))
}

/// `POST /api/user/{id}/points`
pub(super) async fn handler_user_points(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<AwardPointsRequest>, JsonRejection>,
) -> Result<Json<PointsResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::award_points(&state, id, req).await?))
}

/// `POST /api/user/{id}/wallet`
pub(super) async fn handler_user_wallet(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> Result<Json<WalletResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::link_wallet(&state, id, req).await?))
}
