//! Append-only conflict history.

use parking_lot::RwLock;
use stepsync_protocol::{ConflictStatus, DataConflict, STALENESS_WINDOW_MS};

/// Append-only record of detected conflicts, queryable per player.
///
/// Entries are never deleted except by retention cleanup, and a pending
/// entry is never aged out.
#[derive(Debug, Default)]
pub struct ConflictHistoryStore {
    entries: RwLock<Vec<DataConflict>>,
}

impl ConflictHistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a conflict.
    pub fn record(&self, conflict: DataConflict) {
        self.entries.write().push(conflict);
    }

    /// Looks up a conflict by id.
    pub fn get(&self, conflict_id: &str) -> Option<DataConflict> {
        self.entries
            .read()
            .iter()
            .find(|c| c.id == conflict_id)
            .cloned()
    }

    /// Updates the lifecycle status of a conflict. Returns false if no such
    /// conflict exists.
    pub fn mark(&self, conflict_id: &str, status: ConflictStatus) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|c| c.id == conflict_id) {
            Some(conflict) => {
                conflict.status = status;
                true
            }
            None => false,
        }
    }

    /// Returns a player's conflicts, most recent first, paginated.
    pub fn list(&self, player_id: &str, limit: usize, offset: usize) -> Vec<DataConflict> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|c| c.player_id == player_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of a player's conflicts still awaiting resolution.
    pub fn pending_count(&self, player_id: &str) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|c| c.player_id == player_id && c.is_pending())
            .count()
    }

    /// Removes resolved/rejected entries older than the retention window.
    /// Returns the number removed.
    pub fn cleanup(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|c| {
            c.is_pending() || now_ms.saturating_sub(c.detected_at_ms) <= STALENESS_WINDOW_MS
        });
        before - entries.len()
    }

    /// Total number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
