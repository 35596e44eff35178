use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;

/// Application error taxonomy. Every failure a handler can surface maps
/// onto one of these variants and from there onto a status code and the
/// standard `ApiResponse` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input or an unresolved foreign reference. The caller
    /// can fix the request and retry; nothing was mutated.
    #[error("{0}")]
    Validation(String),

    /// The requested interval overlaps an existing appointment for the
    /// same professional. Carries the blocking appointment so the caller
    /// can explain the rejection.
    #[error("conflicts with appointment {id} for professional {professional_id} ({start} to {end})")]
    Conflict {
        id: i64,
        professional_id: i64,
        start: String,
        end: String,
    },

    /// The referenced record does not exist (stale id).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The record is still referenced by appointments and cannot be
    /// deleted without orphaning them.
    #[error("{entity} is referenced by {count} appointment(s)")]
    Referenced { entity: &'static str, count: i64 },

    /// Transaction or connectivity failure. Not retried here; the caller
    /// may retry the whole operation.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The payment provider rejected or failed the request.
    #[error("payment provider error: {0}")]
    Upstream(String),

    /// Spreadsheet generation failure.
    #[error("export failed: {0}")]
    Export(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Referenced { .. } => StatusCode::CONFLICT,
            AppError::Storage(e) => {
                tracing::error!("storage error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Do not leak driver internals to the client.
        let message = match &self {
            AppError::Storage(_) => "storage error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
