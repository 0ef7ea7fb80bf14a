use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// No usable credentials on file; the user has to authorize again.
    #[error("authorization required: {0}")]
    Auth(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("picker session expired")]
    SessionExpired,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("media unavailable (upstream status {0})")]
    MediaUnavailable(u16),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Transient upstream failures are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Upstream(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Auth(reason) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "authorization_required",
                reason.clone(),
            ),
            AppError::Upstream(e) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream_failed",
                e.clone(),
            ),
            AppError::SessionExpired => (
                StatusCode::GONE,
                "session_error",
                "session_expired",
                "picker session expired; start a new pick".to_string(),
            ),
            AppError::MediaUnavailable(upstream) => (
                StatusCode::from_u16(*upstream)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
                "media_unavailable",
                "media could not be fetched".to_string(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                "not found".to_string(),
            ),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "storage_error",
                    "local storage failure".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
