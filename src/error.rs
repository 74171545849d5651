use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, services::save_coordinator::InvariantViolation};

/// Failures of the load/save pipeline.
#[derive(Debug, Error)]
pub enum PersistError {
    /// No aggregate profile exists for the account; the join must not proceed.
    #[error("no profile stored for `{auth_id}`")]
    ProfileNotFound {
        /// Account that was looked up.
        auth_id: String,
    },
    /// Creation was asked for an account that already has a profile.
    #[error("a profile already exists for `{auth_id}`")]
    ProfileExists {
        /// Account that already exists.
        auth_id: String,
    },
    /// The record's auth id or player id is malformed.
    #[error("invalid player identity: {0}")]
    InvalidIdentity(#[from] ValidationErrors),
    /// Aggregate read or write failed, or an auxiliary read failed for a reason other than a
    /// missing schema object.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Two writes for the same key overlapped.
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
    /// The flush loop this save was coalesced into stopped on an error.
    #[error("flush of `{auth_id}` aborted: {message}")]
    FlushAborted {
        /// Player whose flush stopped.
        auth_id: String,
        /// Error the loop stopped on.
        message: String,
    },
    /// The spawned flush task panicked or was cancelled.
    #[error("flush task failed")]
    Worker(#[from] JoinError),
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation conflicts with existing data or an open session.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Pipeline bookkeeping failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<PersistError> for ServiceError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::ProfileNotFound { auth_id } => {
                ServiceError::NotFound(format!("player `{auth_id}`"))
            }
            PersistError::ProfileExists { auth_id } => {
                ServiceError::Conflict(format!("player `{auth_id}` already exists"))
            }
            PersistError::InvalidIdentity(errors) => ServiceError::InvalidInput(errors.to_string()),
            PersistError::Storage(source) => ServiceError::Unavailable(source),
            other @ (PersistError::InvariantViolation(_)
            | PersistError::FlushAborted { .. }
            | PersistError::Worker(_)) => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
