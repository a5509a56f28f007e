//! Pre-sync backups and restore.
//!
//! A backup snapshots a player's authoritative record before any mutation.
//! Restoring from it is the only way a partially-applied sync is undone. A
//! backup is owned by the transaction that created it and is read-only
//! afterwards, except for retention cleanup.

use parking_lot::RwLock;
use std::collections::HashMap;
use stepsync_protocol::{PlayerRecord, STALENESS_WINDOW_MS};
use uuid::Uuid;

/// How long backups are retained once superseded (7 days).
pub const BACKUP_RETENTION_MS: u64 = STALENESS_WINDOW_MS;

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Taken at the start of a sync, before any mutation.
    PreSync,
    /// Taken before applying a manual conflict resolution.
    RollbackPoint,
}

/// A snapshot of a player's authoritative state.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupData {
    /// Unique backup id.
    pub id: String,
    /// The player whose state was snapshotted.
    pub player_id: String,
    /// The snapshotted record.
    pub snapshot: PlayerRecord,
    /// When the backup was taken.
    pub created_at_ms: u64,
    /// Why the backup was taken.
    pub kind: BackupKind,
}

/// In-memory backup store.
///
/// Append/snapshot-only; safe for concurrent writers across different
/// players.
#[derive(Debug, Default)]
pub struct BackupStore {
    backups: RwLock<HashMap<String, BackupData>>,
    latest: RwLock<HashMap<String, String>>,
}

impl BackupStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots a record, returning the stored backup.
    pub fn create(
        &self,
        player_id: &str,
        record: &PlayerRecord,
        kind: BackupKind,
        now_ms: u64,
    ) -> BackupData {
        let backup = BackupData {
            id: Uuid::new_v4().to_string(),
            player_id: player_id.to_string(),
            snapshot: record.clone(),
            created_at_ms: now_ms,
            kind,
        };

        self.backups
            .write()
            .insert(backup.id.clone(), backup.clone());
        self.latest
            .write()
            .insert(player_id.to_string(), backup.id.clone());

        backup
    }

    /// Looks up a backup by id.
    pub fn get(&self, backup_id: &str) -> Option<BackupData> {
        self.backups.read().get(backup_id).cloned()
    }

    /// Returns the most recent backup for a player.
    pub fn latest_for(&self, player_id: &str) -> Option<BackupData> {
        let latest = self.latest.read();
        let id = latest.get(player_id)?;
        self.backups.read().get(id).cloned()
    }

    /// Removes backups older than the retention window, keeping each
    /// player's latest regardless of age. Returns the number removed.
    pub fn cleanup(&self, now_ms: u64) -> usize {
        let latest = self.latest.read();
        let mut backups = self.backups.write();
        let before = backups.len();

        backups.retain(|id, backup| {
            let is_latest = latest.get(&backup.player_id).map(String::as_str) == Some(id.as_str());
            is_latest || now_ms.saturating_sub(backup.created_at_ms) <= BACKUP_RETENTION_MS
        });

        before - backups.len()
    }

    /// Number of retained backups.
    pub fn len(&self) -> usize {
        self.backups.read().len()
    }

    /// Returns true if no backups are retained.
    pub fn is_empty(&self) -> bool {
        self.backups.read().is_empty()
    }
}
