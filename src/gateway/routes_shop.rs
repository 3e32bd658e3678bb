//! The shop listing and purchases: generators, boosts and permanent upgrades.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use std::sync::Arc;

use super::error::{body, path_id, ApiError};
use super::{session, AppState};
use crate::protocol::{
    BoostRequest, BoostResponse, CatalogResponse, GeneratorRequest, GeneratorResponse,
    UpgradeRequest, UpgradeResponse,
};

/// `GET /api/catalog`
pub(super) async fn handler_catalog(State(state): State<Arc<AppState>>) -> Json<CatalogResponse> {
    Json(state.economy.listing())
}

/// `POST /api/user/{id}/generators`. `{generatorId}` upgrades an owned
/// generator, `{newGenerator}` unlocks a new tier.
pub(super) async fn handler_user_generators(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<GeneratorRequest>, JsonRejection>,
) -> Result<Json<GeneratorResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::generators(&state, id, req).await?))
}

/// `POST /api/user/{id}/boosts`
pub(super) async fn handler_user_boosts(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BoostRequest>, JsonRejection>,
) -> Result<Json<BoostResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::purchase_boost(&state, id, req).await?))
}

/// `POST /api/user/{id}/upgrades`
pub(super) async fn handler_user_upgrades(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpgradeRequest>, JsonRejection>,
) -> Result<Json<UpgradeResponse>, ApiError> {
    let id = path_id(id)?;
    let req = body(payload)?;
    Ok(Json(session::purchase_upgrade(&state, id, req).await?))
}
