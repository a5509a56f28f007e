//! Error types for the sync server.

use stepsync_engine::{EngineError, ValidationReport};
use stepsync_protocol::ErrorBody;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request failed validation.
    #[error("validation failed: {}", .0.summary())]
    Validation(ValidationReport),

    /// The request body or path is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The addressed conflict is no longer pending.
    #[error("conflict gone: {0}")]
    ConflictGone(String),

    /// The engine failed internally.
    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl ServerError {
    /// The HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Validation(_) | ServerError::InvalidRequest(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::ConflictGone(_) => 409,
            ServerError::Engine(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// The wire error body for this error.
    pub fn error_body(&self) -> ErrorBody {
        let code = match self {
            ServerError::Validation(report) => report
                .errors
                .first()
                .map(|e| e.code())
                .unwrap_or("VALIDATION_ERROR"),
            ServerError::InvalidRequest(_) => "VALIDATION_ERROR",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::ConflictGone(_) => "CONFLICT_GONE",
            ServerError::Engine(_) => "INTERNAL_ERROR",
        };
        ErrorBody::new(code, self.to_string())
    }
}

impl From<EngineError> for ServerError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Validation { report } => ServerError::Validation(report),
            EngineError::UnknownConflict(_)
            | EngineError::UnknownTransaction(_)
            | EngineError::UnknownPlayer(_) => ServerError::NotFound(error.to_string()),
            EngineError::ConflictNotPending(_) => ServerError::ConflictGone(error.to_string()),
            EngineError::InvalidResolution(_) => ServerError::InvalidRequest(error.to_string()),
            EngineError::Storage(_) | EngineError::Internal(_) => ServerError::Engine(error),
        }
    }
}
