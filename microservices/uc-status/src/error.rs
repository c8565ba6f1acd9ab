//! Error types for UC Status

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use brivas_core::BrivasError;
use brivas_uc_health::{BackendError, HealthError};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// UC Status error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid server record: {0}")]
    InvalidServer(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error(transparent)]
    Platform(#[from] BrivasError),
}

impl From<HealthError> for Error {
    fn from(err: HealthError) -> Self {
        match err {
            HealthError::NotFound(id) => Error::ServerNotFound(id.to_string()),
            HealthError::InvalidServer(msg) => Error::InvalidServer(msg),
            HealthError::DeadlineExceeded(_) => Error::Timeout(err.to_string()),
            HealthError::Directory(msg) => Error::Inventory(msg),
        }
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout => Error::Timeout(err.to_string()),
            BackendError::Unreachable(_) | BackendError::NotConfigured(_) => {
                Error::BackendUnavailable(err.to_string())
            }
            BackendError::Fault(_) | BackendError::Malformed(_) | BackendError::Other(_) => {
                Error::Backend(err.to_string())
            }
        }
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::ServerNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::InvalidServer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Backend(_) => StatusCode::BAD_GATEWAY,
            Error::Platform(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::Inventory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {:?}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
