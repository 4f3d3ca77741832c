/// Unified error types for the Fingerpost directory server
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for directory operations
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lookup target with no mapping
    #[error("Not found: {0}")]
    NotFound(String),

    /// A locator already owned by another record or account
    #[error("Duplicate locator: {0}")]
    DuplicateLocator(String),

    /// A record already exists where none may
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing mandatory identity fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Durable read/write failures
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A persisted unit that failed to parse
    #[error("Malformed unit: {0}")]
    Malformed(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body returned to API callers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert DirectoryError to HTTP response
impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            DirectoryError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "NotFound", self.to_string())
            }
            DirectoryError::DuplicateLocator(_) => {
                (StatusCode::CONFLICT, "DuplicateLocator", self.to_string())
            }
            DirectoryError::Conflict(_) => {
                (StatusCode::CONFLICT, "Conflict", self.to_string())
            }
            DirectoryError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            DirectoryError::Database(_)
            | DirectoryError::Io(_)
            | DirectoryError::Json(_)
            | DirectoryError::Persistence(_)
            | DirectoryError::Malformed(_)
            | DirectoryError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;
