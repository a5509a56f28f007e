//! Durable local player state.

use crate::client::ClientState;
use crate::error::ClientResult;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// Persistence for the client's local state (step sample, resource view,
/// last successful sync). Same whole-value rewrite contract as the queue
/// backends.
pub trait StateBackend: Send + Sync {
    /// Loads the persisted state, if any.
    fn load(&self) -> ClientResult<Option<ClientState>>;

    /// Replaces the persisted state.
    fn persist(&self, state: &ClientState) -> ClientResult<()>;
}

/// An in-memory state backend.
#[derive(Debug, Default)]
pub struct MemoryStateBackend {
    data: Mutex<Option<ClientState>>,
}

impl MemoryStateBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with state, for restart-recovery tests.
    pub fn with_state(state: ClientState) -> Self {
        Self {
            data: Mutex::new(Some(state)),
        }
    }
}

impl StateBackend for MemoryStateBackend {
    fn load(&self) -> ClientResult<Option<ClientState>> {
        Ok(self.data.lock().clone())
    }

    fn persist(&self, state: &ClientState) -> ClientResult<()> {
        *self.data.lock() = Some(state.clone());
        Ok(())
    }
}

/// A file-backed state backend (one JSON document).
#[derive(Debug)]
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    /// Creates a backend over the given file path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateBackend for FileStateBackend {
    fn load(&self) -> ClientResult<Option<ClientState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn persist(&self, state: &ClientState) -> ClientResult<()> {
        let contents = serde_json::to_string(state)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}
