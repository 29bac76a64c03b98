//! Server error types with HTTP status code mapping

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error type wrapping the lower layers and providing HTTP status
/// mapping. Responses are plain text, one line, newline-terminated.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Cache layer error
    #[error(transparent)]
    Cache(#[from] recsched_cache::Error),

    /// Core layer error
    #[error(transparent)]
    Core(#[from] recsched_core::Error),

    /// Exporter error
    #[error(transparent)]
    Export(#[from] recsched_export::Error),

    /// Malformed request (bad spec, unknown parameter, out-of-range limit)
    #[error("{0}")]
    BadRequest(String),

    /// No matching resource
    #[error("{0}")]
    NotFound(String),

    /// No data imported yet
    #[error("{0}")]
    Unavailable(String),

    /// Internal failure
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a bad request error (400)
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    /// Create a not found error (404)
    pub fn not_found(msg: impl Into<String>) -> Self {
        ServerError::NotFound(msg.into())
    }

    /// Create a service-unavailable error (503)
    pub fn unavailable(msg: impl Into<String>) -> Self {
        ServerError::Unavailable(msg.into())
    }

    /// Create an internal error (500)
    pub fn internal(msg: impl Into<String>) -> Self {
        ServerError::Internal(msg.into())
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            ServerError::Core(recsched_core::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            ServerError::Core(recsched_core::Error::NotFound(_)) => StatusCode::NOT_FOUND,

            // storage, git, export, consistency: the request cannot be served
            ServerError::Cache(_) | ServerError::Core(_) | ServerError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }
        let body = format!("{self}\n");
        (
            status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::Core(recsched_core::Error::validation("bad")).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
