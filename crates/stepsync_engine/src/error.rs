//! Error types for the reconciliation engine.

use crate::validator::ValidationReport;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the reconciliation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The sync request failed validation. Terminal for this attempt; the
    /// client must correct its data before retrying.
    #[error("validation failed: {}", .report.summary())]
    Validation {
        /// The full validation report.
        report: ValidationReport,
    },

    /// The storage layer failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// No backup is registered for the given transaction id.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// No conflict exists with the given id.
    #[error("unknown conflict: {0}")]
    UnknownConflict(String),

    /// The conflict was already resolved or rejected.
    #[error("conflict {0} is no longer pending")]
    ConflictNotPending(String),

    /// No record exists for the given player.
    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    /// The requested resolution cannot be applied.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns true if the operation may succeed on retry without any
    /// client-side correction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }

    /// Returns true if the caller sent something the engine rejects (maps
    /// to a 4xx status at the HTTP layer).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation { .. }
                | EngineError::UnknownTransaction(_)
                | EngineError::UnknownConflict(_)
                | EngineError::ConflictNotPending(_)
                | EngineError::UnknownPlayer(_)
                | EngineError::InvalidResolution(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::Storage("disk full".into()).is_retryable());
        assert!(!EngineError::UnknownConflict("c-1".into()).is_retryable());
        assert!(!EngineError::Internal("bug".into()).is_retryable());
    }

    #[test]
    fn client_error_classification() {
        assert!(EngineError::UnknownPlayer("p".into()).is_client_error());
        assert!(EngineError::InvalidResolution("bad".into()).is_client_error());
        assert!(!EngineError::Storage("io".into()).is_client_error());
    }

    #[test]
    fn error_display() {
        let err = EngineError::ConflictNotPending("c-9".into());
        assert!(err.to_string().contains("c-9"));

        let err = EngineError::UnknownTransaction("t-1".into());
        assert_eq!(err.to_string(), "unknown transaction: t-1");
    }
}
