//! The durable, bounded operation queue.

use crate::error::ClientResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use stepsync_protocol::SyncOperation;

/// Maximum number of queued operations. Enqueueing past the cap evicts the
/// oldest entry first.
pub const MAX_QUEUE_LEN: usize = 1000;

/// Persistence for the operation queue.
///
/// Backends are whole-queue stores: every mutation rewrites the persisted
/// representation in full, so durability is last-write-wins at the
/// granularity of the whole queue.
pub trait QueueBackend: Send + Sync {
    /// Loads the persisted queue, oldest first.
    fn load(&self) -> ClientResult<Vec<SyncOperation>>;

    /// Replaces the persisted queue.
    fn persist(&self, operations: &[SyncOperation]) -> ClientResult<()>;
}

/// An in-memory queue backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Mutex<Vec<SyncOperation>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with operations, for restart-recovery
    /// tests.
    pub fn with_operations(operations: Vec<SyncOperation>) -> Self {
        Self {
            data: Mutex::new(operations),
        }
    }

    /// Returns a copy of the persisted operations.
    pub fn data(&self) -> Vec<SyncOperation> {
        self.data.lock().clone()
    }
}

impl QueueBackend for MemoryBackend {
    fn load(&self) -> ClientResult<Vec<SyncOperation>> {
        Ok(self.data.lock().clone())
    }

    fn persist(&self, operations: &[SyncOperation]) -> ClientResult<()> {
        *self.data.lock() = operations.to_vec();
        Ok(())
    }
}

/// A file-backed queue backend.
///
/// The queue is one JSON array; `persist` rewrites the whole file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend over the given file path. The file is created on
    /// first persist.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl QueueBackend for FileBackend {
    fn load(&self) -> ClientResult<Vec<SyncOperation>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self, operations: &[SyncOperation]) -> ClientResult<()> {
        let contents = serde_json::to_string(operations)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Client-resident FIFO of operations awaiting sync.
///
/// Bounded at [`MAX_QUEUE_LEN`]; survives process restart through its
/// backend. `drain` is atomic with respect to concurrent `enqueue` calls.
pub struct OperationQueue<B: QueueBackend> {
    backend: B,
    inner: Mutex<VecDeque<SyncOperation>>,
}

impl<B: QueueBackend> OperationQueue<B> {
    /// Opens the queue, reloading any persisted operations.
    pub fn open(backend: B) -> ClientResult<Self> {
        let persisted = backend.load()?;
        Ok(Self {
            backend,
            inner: Mutex::new(persisted.into()),
        })
    }

    /// Appends an operation, evicting the oldest entry if the queue is
    /// full. Returns the evicted operation, if any.
    pub fn enqueue(&self, operation: SyncOperation) -> ClientResult<Option<SyncOperation>> {
        let mut inner = self.inner.lock();
        inner.push_back(operation);
        let evicted = if inner.len() > MAX_QUEUE_LEN {
            inner.pop_front()
        } else {
            None
        };
        self.backend.persist(inner.make_contiguous())?;
        Ok(evicted)
    }

    /// Returns and clears all queued operations, oldest first.
    pub fn drain(&self) -> ClientResult<Vec<SyncOperation>> {
        let mut inner = self.inner.lock();
        let drained: Vec<SyncOperation> = inner.drain(..).collect();
        self.backend.persist(&[])?;
        Ok(drained)
    }

    /// Reinstates unconfirmed operations at the front of the queue,
    /// preserving their order. The bound still applies: the oldest entries
    /// are evicted if the queue overflows.
    pub fn requeue_front(&self, operations: Vec<SyncOperation>) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        for operation in operations.into_iter().rev() {
            inner.push_front(operation);
        }
        while inner.len() > MAX_QUEUE_LEN {
            inner.pop_front();
        }
        self.backend.persist(inner.make_contiguous())?;
        Ok(())
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
