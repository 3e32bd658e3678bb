//! `POST /api/auth/telegram`: sign-in and first-time account creation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use std::sync::Arc;

use super::error::{body, ApiError};
use super::{session, AppState};
use crate::protocol::{AuthResponse, TelegramAuthRequest};

/// Verifies the identity payload, creates the account on first sight (crediting
/// the referrer named by `start_param`), and returns the full snapshot.
pub(super) async fn handler_auth_telegram(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TelegramAuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let req = body(payload)?;
    let user = session::authenticate(&state, req).await?;
    Ok(Json(AuthResponse {
        success: true,
        user,
    }))
}
