use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileCityError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    Timeout(String),

    /// An absolute path could not be expressed relative to the root.
    #[error("Server path mapping error")]
    InternalMapping,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FileCityError>;

// Malformed requests are reported in the same JSON shape as every other error.
impl From<QueryRejection> for FileCityError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<JsonRejection> for FileCityError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl FileCityError {
    /// Stable category string reported to clients.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::AccessDenied(_) => "access_denied",
            Self::NotFound(_) => "not_found",
            Self::Unsupported(_) => "unsupported",
            Self::Timeout(_) => "timeout",
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => "not_found",
                std::io::ErrorKind::PermissionDenied => "access_denied",
                _ => "internal",
            },
            Self::InternalMapping | Self::Json(_) | Self::Config(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::Unsupported(_) => StatusCode::BAD_REQUEST,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InternalMapping | Self::Json(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for FileCityError {
    fn into_response(self) -> Response {
        let status = self.status();
        // IO and serialization messages can carry host details; keep them in the log only.
        let detail = match &self {
            Self::Io(_) | Self::Json(_) | Self::Config(_) => {
                tracing::error!("request failed: {}", self);
                match status {
                    StatusCode::NOT_FOUND => "Path not found".to_string(),
                    StatusCode::FORBIDDEN => "Access denied".to_string(),
                    _ => "Internal server error".to_string(),
                }
            }
            Self::InternalMapping => {
                tracing::error!("request failed: {}", self);
                self.to_string()
            }
            _ => {
                tracing::debug!("request rejected: {}", self);
                self.to_string()
            }
        };

        let body = json!({
            "error": self.category(),
            "detail": detail,
        });
        (status, Json(body)).into_response()
    }
}
