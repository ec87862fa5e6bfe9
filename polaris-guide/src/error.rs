//! Error types for polaris-guide

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for polaris-guide
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared library (config, catalog, settings)
    #[error(transparent)]
    Common(#[from] polaris_common::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Chat completion request failed or returned an error status
    #[error("Chat service error: {0}")]
    ChatService(String),

    /// Speech synthesis request failed or returned an error status
    #[error("Speech service error: {0}")]
    SpeechService(String),

    /// Decoding or output device failure
    #[error("Audio error: {0}")]
    Audio(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation needs an open narration session
    #[error("No landmark is open")]
    NoActiveSession,
}

/// Convenience Result type using polaris-guide Error
pub type Result<T> = std::result::Result<T, Error>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a question sent while narration is running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Common(polaris_common::Error::NotFound(msg)) => ApiError::NotFound(msg),
            Error::Common(polaris_common::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            Error::NoActiveSession => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<polaris_common::Error> for ApiError {
    fn from(err: polaris_common::Error) -> Self {
        ApiError::from(Error::Common(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
