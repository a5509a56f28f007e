//! Error types for the client runtime.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client sync runtime.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport failure. Always safe to retry: the server
    /// validates and backs up before committing, and the queue keeps the
    /// unconfirmed batch.
    #[error("Network error during sync")]
    Network {
        /// Underlying transport message.
        message: String,
    },

    /// The server's response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A sync is already running in this client.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Local persistence failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Local (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Creates a network error from a transport message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns true if retrying without local changes may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network { .. })
    }
}
