//! Application-level error type returned by handlers.
//!
//! Every variant serialises to the `{status, message}` envelope. Internal
//! failures are logged with their cause and answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use netinsight::SubmissionError;
use netinsight_api::{messages, StatusResponse};

use crate::storage::StorageError;

/// An error that a handler can return; converts directly to an HTTP response.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    /// The payload is the cause, for the log. Clients never see it.
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(cause) => {
                tracing::error!("internal error: {cause}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    messages::INTERNAL_ERROR.to_string(),
                )
            }
        };
        (status, Json(StatusResponse::error(message))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => AppError::NotFound("Not found.".into()),
            StorageError::Unbound(_) => AppError::Forbidden(messages::HOSTNAME_NOT_BOUND.into()),
            StorageError::Busy(msg) => AppError::Internal(format!("database busy: {msg}")),
            StorageError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SubmissionError> for AppError {
    fn from(e: SubmissionError) -> Self {
        match e {
            SubmissionError::InvalidJson(_) | SubmissionError::MissingTimestamp => {
                AppError::BadRequest(messages::INVALID_PAYLOAD.into())
            }
            SubmissionError::MissingHostname => {
                AppError::BadRequest(messages::MISSING_HOSTNAME.into())
            }
        }
    }
}
