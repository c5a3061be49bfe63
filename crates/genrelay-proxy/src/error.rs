//! HTTP error type and mappings from domain errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use genrelay_core::{DecodeError, EncodeError, ValidationError};

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Bad request (undecodable or invalid body).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => {
                error!("internal server error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<DecodeError> for HttpError {
    fn from(err: DecodeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<ValidationError> for HttpError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<EncodeError> for HttpError {
    fn from(err: EncodeError) -> Self {
        Self::Internal(err.to_string())
    }
}
