//! Error types shared across all four services.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RagError>;

/// Error taxonomy. Every variant maps to one of the HTTP statuses named
/// in the error handling design: 400, 404, 499, 502.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("upstream failure: {0}")]
    ExternalService(String),

    #[error("operation cancelled")]
    OperationCancelled,

    #[error("{0}")]
    Domain(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RagError {
    /// Whether a caller-side retry loop might reasonably reattempt this
    /// error. Advisory only — the propagation policy forbids automatic
    /// retries, so this is consulted by logging/metrics, not control flow.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::ExternalService(_) | RagError::Http(_))
    }

    /// HTTP status this error surfaces as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::OperationCancelled => StatusCode::from_u16(499).unwrap(),
            RagError::ExternalService(_) | RagError::Http(_) => StatusCode::BAD_GATEWAY,
            RagError::Database(_) | RagError::Serialization(_) | RagError::Io(_) => {
                StatusCode::BAD_GATEWAY
            }
            RagError::Domain(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Build an `ExternalService` error with the diagnostic shape the
    /// design calls for: class, message, status, brief body/URL.
    pub fn external(class: &str, message: impl std::fmt::Display, context: &str) -> Self {
        RagError::ExternalService(format!("{class}: {message} ({context})"))
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if matches!(self, RagError::ExternalService(_) | RagError::Http(_)) {
            tracing::warn!(error = %self, "upstream call failed");
        }
        let body = json!({ "detail": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
