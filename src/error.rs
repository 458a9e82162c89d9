//! Error handling for the parking gate server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::gate_relay::GateFailure;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input (missing UID, state-string length mismatch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown UID, no active record for exit
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate-in-state, too-soon exit
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No fresh plate sample arrived within the capture window
    #[error("Recognition timeout: {0}")]
    RecognitionTimeout(String),

    /// Recognized plate differs from the expected plate
    #[error("Recognition mismatch: {0}")]
    RecognitionMismatch(String),

    /// Recognition service or gate controller unreachable / timed out
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Gate command requested before any controller address was learned
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    /// Gate controller failed (timeout / error response / unreachable)
    #[error("Gate error: {0}")]
    Gate(#[from] GateFailure),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl Error {
    /// Machine-readable code, shared with decision denial reasons
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::RecognitionTimeout(_) => "RECOGNITION_TIMEOUT",
            Error::RecognitionMismatch(_) => "RECOGNITION_MISMATCH",
            Error::UpstreamUnavailable(_) | Error::Http(_) | Error::Gate(_) => {
                "UPSTREAM_UNAVAILABLE"
            }
            Error::UnknownTarget(_) => "UNKNOWN_TARGET",
            Error::Database(_) | Error::Sqlx(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::RecognitionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::RecognitionMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::UpstreamUnavailable(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Gate(GateFailure::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Error::Gate(_) => StatusCode::BAD_GATEWAY,
            Error::UnknownTarget(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_)
            | Error::Sqlx(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.error_code();
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
