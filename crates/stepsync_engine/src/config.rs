//! Configuration for the reconciliation engine.

use stepsync_protocol::{MAX_PENDING_OPERATIONS, STALENESS_WINDOW_MS};

/// Configuration for sync processing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum age of offline data eligible for sync.
    pub offline_window_ms: u64,
    /// Maximum operations accepted in one sync request.
    pub max_operations_per_sync: usize,
    /// How long backups and resolved conflicts are retained.
    pub retention_ms: u64,
    /// How many applied operation ids are remembered per player for replay
    /// de-duplication.
    pub applied_ledger_capacity: usize,
    /// Steps required to earn one cell.
    pub steps_per_cell: i64,
    /// Steps required to earn one experience point.
    pub steps_per_experience_point: i64,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            offline_window_ms: STALENESS_WINDOW_MS,
            max_operations_per_sync: MAX_PENDING_OPERATIONS,
            retention_ms: STALENESS_WINDOW_MS,
            applied_ledger_capacity: MAX_PENDING_OPERATIONS,
            steps_per_cell: 1000,
            steps_per_experience_point: 100,
        }
    }

    /// Sets the offline staleness window.
    pub fn with_offline_window_ms(mut self, window_ms: u64) -> Self {
        self.offline_window_ms = window_ms;
        self
    }

    /// Sets the per-request operation cap.
    pub fn with_max_operations_per_sync(mut self, max: usize) -> Self {
        self.max_operations_per_sync = max;
        self
    }

    /// Sets the backup/history retention window.
    pub fn with_retention_ms(mut self, retention_ms: u64) -> Self {
        self.retention_ms = retention_ms;
        self
    }

    /// Sets the idempotency ledger capacity.
    pub fn with_applied_ledger_capacity(mut self, capacity: usize) -> Self {
        self.applied_ledger_capacity = capacity;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
