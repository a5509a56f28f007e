//! The player-record storage seam.

use crate::error::EngineResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use stepsync_protocol::PlayerRecord;

/// Storage for authoritative player records.
///
/// The persistent database behind the sync engine is an external
/// collaborator; this trait is the whole seam. The engine requires only
/// whole-record reads and writes; transactionality is provided above this
/// trait by backup-then-commit-or-restore.
///
/// # Invariants
///
/// - `save` replaces the whole record atomically
/// - `load` returns exactly what the last `save` wrote
pub trait PlayerStore: Send + Sync {
    /// Loads a player's record, or `None` if the player has never synced.
    fn load(&self, player_id: &str) -> EngineResult<Option<PlayerRecord>>;

    /// Writes a player's record.
    fn save(&self, record: &PlayerRecord) -> EngineResult<()>;
}

/// An in-memory player store.
#[derive(Debug, Default)]
pub struct MemoryPlayerStore {
    records: RwLock<HashMap<String, PlayerRecord>>,
}

impl MemoryPlayerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl PlayerStore for MemoryPlayerStore {
    fn load(&self, player_id: &str) -> EngineResult<Option<PlayerRecord>> {
        Ok(self.records.read().get(player_id).cloned())
    }

    fn save(&self, record: &PlayerRecord) -> EngineResult<()> {
        self.records
            .write()
            .insert(record.player_id.clone(), record.clone());
        Ok(())
    }
}
