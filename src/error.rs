//! # Error Handling
//!
//! Custom error types for the whole service and their conversion to HTTP
//! responses. Every fallible surface maps onto one of these variants:
//!
//! ## Error Categories:
//! - **Transport/validation**: `BadRequest`, `ValidationError` (400)
//! - **Missing resources**: `NotFound` (404)
//! - **Soft-delete conflicts**: `Conflict` (409) - restoring over a live row
//! - **Audio pipeline**: `CorruptAudio`, `MissingPriorAudio` - fatal to one
//!   session's finalization, never to the process
//! - **Model pipeline**: `ModelLoad`, `Inference` - reported to the affected
//!   session, retried or skipped there
//! - **Review gateway**: `ReviewUnavailable` (503) - callers must treat as
//!   non-fatal
//! - **Server side**: `Internal`, `ConfigError` (500)
//!
//! WebSocket sessions report these through `error` events rather than HTTP
//! status codes; `AppError::kind()` supplies the machine-readable tag used
//! in both places.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Application-wide error type.
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (I/O failures, poisoned locks, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Operation conflicts with existing state (e.g. restore over a live id)
    Conflict(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// Accumulated audio fragments could not be decoded into an artifact
    CorruptAudio(String),

    /// A resume target referenced an audio artifact that does not exist
    MissingPriorAudio(String),

    /// Whisper model download or initialization failed
    ModelLoad(String),

    /// A transcription pass failed on otherwise-accepted audio
    Inference(String),

    /// The AI review service is unreachable or answered with an error
    ReviewUnavailable(String),
}

impl AppError {
    /// Machine-readable error tag, shared by HTTP bodies and WebSocket
    /// `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::CorruptAudio(_) => "corrupt_audio",
            AppError::MissingPriorAudio(_) => "missing_prior_audio",
            AppError::ModelLoad(_) => "model_load_error",
            AppError::Inference(_) => "inference_error",
            AppError::ReviewUnavailable(_) => "review_unavailable",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::CorruptAudio(msg)
            | AppError::MissingPriorAudio(msg)
            | AppError::ModelLoad(msg)
            | AppError::Inference(msg)
            | AppError::ReviewUnavailable(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::CorruptAudio(msg) => write!(f, "Corrupt audio: {}", msg),
            AppError::MissingPriorAudio(msg) => write!(f, "Missing prior audio: {}", msg),
            AppError::ModelLoad(msg) => write!(f, "Model load error: {}", msg),
            AppError::Inference(msg) => write!(f, "Inference error: {}", msg),
            AppError::ReviewUnavailable(msg) => write!(f, "Review service unavailable: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let status = match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::MissingPriorAudio(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::CorruptAudio(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ModelLoad(_) | AppError::Inference(_) => StatusCode::BAD_GATEWAY,
            AppError::ReviewUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors come from client payloads, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound("Record not found".to_string())
            }
            other => AppError::Internal(format!("Database error: {}", other)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(AppError::CorruptAudio("x".into()).kind(), "corrupt_audio");
        assert_eq!(AppError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(
            AppError::ReviewUnavailable("x".into()).kind(),
            "review_unavailable"
        );
    }

    #[test]
    fn test_status_mapping() {
        use actix_web::http::StatusCode;

        let cases = [
            (AppError::BadRequest("m".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("m".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("m".into()), StatusCode::CONFLICT),
            (
                AppError::CorruptAudio("m".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::ReviewUnavailable("m".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.error_response().status(), expected, "{}", err);
        }
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), "not_found");
    }
}
