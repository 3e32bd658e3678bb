//! Structured failure responses.
//!
//! Every failed request answers `{ "success": false, "message": ... }`.
//! Storage failures keep their detail in the logs and return a generic
//! message.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::economy::EconomyError;
use crate::protocol::FailureResponse;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{what} not found"),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EconomyError> for ApiError {
    fn from(err: EconomyError) -> Self {
        match err {
            EconomyError::Validation(message) => {
                debug!(%message, "rejected request");
                Self::bad_request(message)
            }
            EconomyError::NotFound(what) => Self::not_found(what),
            EconomyError::InsufficientFunds { required, available } => {
                debug!(required, available, "insufficient funds");
                Self::bad_request("Not enough points")
            }
            EconomyError::Storage(e) => {
                error!(error = %e, "storage failure");
                Self::internal()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        EconomyError::Storage(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(FailureResponse {
                success: false,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Unwrap a JSON body, turning axum's rejection into a validation failure.
pub(super) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(format!("Invalid request: {}", rejection.body_text())))
}

/// Unwrap a numeric path id.
pub(super) fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::bad_request("Invalid user ID"))
}
