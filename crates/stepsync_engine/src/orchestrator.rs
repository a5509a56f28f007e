//! The transactional sync orchestrator.

use crate::backup::{BackupKind, BackupStore};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::ConflictHistoryStore;
use crate::resolver::ConflictResolver;
use crate::store::PlayerStore;
use crate::validator::validate;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use stepsync_protocol::{
    unix_time_ms, ConflictResolution, ConflictStatus, DataConflict, OperationFailure,
    OperationPayload, PlayerRecord, PlayerResources, ResolutionStrategy, ResolveConflictRequest,
    StepData, SyncOperation, SyncRequest, SyncResponse, SyncStatus, FIELD_RESOURCES,
    FIELD_STEP_COUNT,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Experience granted for inspecting a cell.
const CELL_INSPECT_XP: u64 = 25;
/// Experience granted for a fusion.
const FUSION_XP: u64 = 50;

/// The state a sync transaction moves through.
///
/// `Idle → Validating → BackedUp → ConflictCheck → (Resolving | Blocked) →
/// Applying → Committed | RolledBack`. Once backed up, a transaction runs
/// to completion (commit or rollback) without external interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No sync in flight.
    Idle,
    /// Checking the request against sanity thresholds.
    Validating,
    /// Pre-mutation snapshot taken.
    BackedUp,
    /// Diffing server state against the client view.
    ConflictCheck,
    /// Running the per-field resolution policies.
    Resolving,
    /// Aborted on conflicts that require manual resolution.
    Blocked,
    /// Applying resolutions and queued operations.
    Applying,
    /// The transaction committed.
    Committed,
    /// The transaction was undone from its backup.
    RolledBack,
}

impl SyncPhase {
    /// Returns true once the transaction can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Blocked | SyncPhase::Committed | SyncPhase::RolledBack
        )
    }
}

/// The unit of work for one sync: its identity and the backup that undoes
/// it. Threaded explicitly through every mutating call.
#[derive(Debug, Clone)]
pub struct SyncTransaction {
    /// Transaction id, addressable via the rollback entry point.
    pub id: String,
    /// The player being synced.
    pub player_id: String,
    /// The pre-mutation backup.
    pub backup_id: String,
    /// When the transaction started.
    pub started_at_ms: u64,
}

impl SyncTransaction {
    fn new(player_id: &str, backup_id: &str, started_at_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            player_id: player_id.to_string(),
            backup_id: backup_id.to_string(),
            started_at_ms,
        }
    }
}

/// Bounded insertion-ordered set of recently applied operation ids.
#[derive(Debug)]
struct AppliedLedger {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl AppliedLedger {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            capacity,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
    }
}

/// Releases the per-player in-flight slot on every exit path.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    player_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.player_id);
    }
}

/// The transactional coordinator for player-data sync.
///
/// One orchestrator is constructed per process (or per test) and injected
/// where needed; there is no module-global instance. Each sync is a single
/// mostly-sequential transaction under a per-player mutual-exclusion slot:
/// a second concurrent attempt for the same player is rejected, not queued.
pub struct SyncOrchestrator<S: PlayerStore> {
    store: Arc<S>,
    backups: BackupStore,
    history: ConflictHistoryStore,
    resolver: ConflictResolver,
    config: EngineConfig,
    in_flight: Mutex<HashSet<String>>,
    applied: Mutex<HashMap<String, AppliedLedger>>,
    transactions: RwLock<HashMap<String, String>>,
}

impl<S: PlayerStore> SyncOrchestrator<S> {
    /// Creates an orchestrator over the given player store with the
    /// standard resolver table and default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            backups: BackupStore::new(),
            history: ConflictHistoryStore::new(),
            resolver: ConflictResolver::new(),
            config: EngineConfig::default(),
            in_flight: Mutex::new(HashSet::new()),
            applied: Mutex::new(HashMap::new()),
            transactions: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the conflict resolver.
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The backup store.
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// The conflict history store.
    pub fn history(&self) -> &ConflictHistoryStore {
        &self.history
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs a sync against the wall clock.
    pub fn sync(&self, request: SyncRequest) -> EngineResult<SyncResponse> {
        self.sync_at(request, unix_time_ms())
    }

    /// Runs a sync with an explicit clock.
    pub fn sync_at(&self, request: SyncRequest, now_ms: u64) -> EngineResult<SyncResponse> {
        let player_id = request.player_id.clone();
        if !self.in_flight.lock().insert(player_id.clone()) {
            warn!(player = %player_id, "rejecting concurrent sync");
            return Ok(SyncResponse::failure(
                "Sync already in progress",
                request.last_sync_ms,
                now_ms,
            ));
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            player_id,
        };

        self.run_sync(request, now_ms)
    }

    fn run_sync(&self, request: SyncRequest, now_ms: u64) -> EngineResult<SyncResponse> {
        debug!(player = %request.player_id, phase = ?SyncPhase::Validating, "sync started");
        let report = validate(&request, now_ms, &self.config);
        if !report.is_valid() {
            warn!(player = %request.player_id, errors = %report.summary(), "sync rejected");
            return Err(EngineError::Validation { report });
        }

        let record = self
            .store
            .load(&request.player_id)?
            .unwrap_or_else(|| PlayerRecord::new(&request.player_id));

        // A backup is always taken before any mutation, so failures while
        // applying operations are recoverable too.
        let backup = self
            .backups
            .create(&request.player_id, &record, BackupKind::PreSync, now_ms);
        let txn = SyncTransaction::new(&request.player_id, &backup.id, now_ms);
        self.transactions
            .write()
            .insert(txn.id.clone(), backup.id.clone());
        debug!(player = %request.player_id, txn = %txn.id, phase = ?SyncPhase::BackedUp, "backup taken");

        debug!(player = %request.player_id, phase = ?SyncPhase::ConflictCheck, "diffing client view");
        let conflicts = detect_conflicts(&request, &record, now_ms);
        for conflict in &conflicts {
            self.history.record(conflict.clone());
        }

        debug!(player = %request.player_id, count = conflicts.len(), phase = ?SyncPhase::Resolving, "resolving conflicts");
        let mut resolutions: Vec<(String, ConflictResolution)> = Vec::new();
        let mut blocked: Vec<DataConflict> = Vec::new();
        for conflict in &conflicts {
            let resolution = self.resolver.resolve(conflict, now_ms);
            if resolution.strategy.is_automatic() {
                resolutions.push((conflict.id.clone(), resolution));
            } else {
                blocked.push(conflict.clone());
            }
        }

        if !blocked.is_empty() {
            info!(player = %request.player_id, count = blocked.len(), phase = ?SyncPhase::Blocked, "sync blocked on manual conflicts");
            self.restore(&txn)?;
            return Ok(SyncResponse::blocked(blocked, record.last_sync_ms, now_ms));
        }

        debug!(player = %request.player_id, phase = ?SyncPhase::Applying, "applying sync");
        let mut working = record.clone();
        let pre_total = record.step_data.total_steps.max(0);

        for (_, resolution) in &resolutions {
            apply_resolution(&mut working, resolution)?;
        }

        reconcile_steps(&mut working, &request.step_data);

        let already_applied: HashSet<String> = {
            let mut ledgers = self.applied.lock();
            let ledger = ledgers
                .entry(request.player_id.clone())
                .or_insert_with(|| AppliedLedger::new(self.config.applied_ledger_capacity));
            request
                .operations
                .iter()
                .filter(|op| ledger.contains(&op.id))
                .map(|op| op.id.clone())
                .collect()
        };

        let mut failed: Vec<OperationFailure> = Vec::new();
        let mut applied_ids: Vec<String> = Vec::new();
        for operation in &request.operations {
            if already_applied.contains(&operation.id) {
                debug!(player = %request.player_id, operation = %operation.id, "skipping replayed operation");
                continue;
            }
            match apply_operation(&mut working, operation) {
                Ok(()) => applied_ids.push(operation.id.clone()),
                Err(message) => {
                    // Soft failure: reported, not aborting.
                    failed.push(OperationFailure {
                        operation_id: operation.id.clone(),
                        error: message,
                    });
                }
            }
        }

        // Credits derive from the step delta across the whole apply, so a
        // replayed request (delta zero) credits nothing.
        let delta = (working.step_data.total_steps - pre_total).max(0);
        let earned = PlayerResources::new(
            (delta / self.config.steps_per_cell) as u64,
            (delta / self.config.steps_per_experience_point) as u64,
        );
        working.resources.cells += earned.cells;
        working.resources.experience_points += earned.experience_points;

        let baseline = if record.last_sync_ms > 0 {
            record.last_sync_ms
        } else {
            request.last_sync_ms
        };
        let synced_days = (now_ms.saturating_sub(baseline) / DAY_MS).min(u32::MAX as u64) as u32;

        working.last_sync_ms = now_ms.max(record.last_sync_ms + 1);

        match self.store.save(&working) {
            Ok(()) => {
                info!(
                    player = %request.player_id,
                    txn = %txn.id,
                    synced_days,
                    operations = applied_ids.len(),
                    phase = ?SyncPhase::Committed,
                    "sync committed"
                );
                {
                    let mut ledgers = self.applied.lock();
                    if let Some(ledger) = ledgers.get_mut(&request.player_id) {
                        for id in applied_ids {
                            ledger.insert(id);
                        }
                    }
                }
                for (conflict_id, _) in &resolutions {
                    self.history.mark(conflict_id, ConflictStatus::Resolved);
                }
                Ok(SyncResponse::committed(
                    synced_days,
                    failed,
                    earned,
                    working.last_sync_ms,
                    now_ms,
                ))
            }
            Err(error) => {
                warn!(player = %request.player_id, txn = %txn.id, %error, phase = ?SyncPhase::RolledBack, "sync rolled back");
                self.restore(&txn)?;
                Ok(SyncResponse::failure(
                    error.to_string(),
                    record.last_sync_ms,
                    now_ms,
                ))
            }
        }
    }

    /// Applies a manually chosen resolution against the wall clock.
    pub fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> EngineResult<PlayerRecord> {
        self.resolve_conflict_at(request, unix_time_ms())
    }

    /// Applies a manually chosen resolution with an explicit clock.
    pub fn resolve_conflict_at(
        &self,
        request: &ResolveConflictRequest,
        now_ms: u64,
    ) -> EngineResult<PlayerRecord> {
        if request.strategy == ResolutionStrategy::ManualReview {
            return Err(EngineError::InvalidResolution(
                "manual review defers the conflict; choose a concrete strategy".into(),
            ));
        }

        let conflict = self
            .history
            .get(&request.conflict_id)
            .ok_or_else(|| EngineError::UnknownConflict(request.conflict_id.clone()))?;
        if !conflict.is_pending() {
            return Err(EngineError::ConflictNotPending(conflict.id.clone()));
        }

        let record = self
            .store
            .load(&conflict.player_id)?
            .ok_or_else(|| EngineError::UnknownPlayer(conflict.player_id.clone()))?;

        let resolved_value = match &request.resolved_value {
            Some(value) => value.clone(),
            None => match request.strategy {
                ResolutionStrategy::ServerWins => conflict.server_value.clone(),
                ResolutionStrategy::ClientWins => conflict.local_value.clone(),
                ResolutionStrategy::MergeValues => stepsync_protocol::merge_numeric_max(
                    &conflict.local_value,
                    &conflict.server_value,
                ),
                ResolutionStrategy::ManualReview => unreachable!("rejected above"),
            },
        };

        let backup =
            self.backups
                .create(&conflict.player_id, &record, BackupKind::RollbackPoint, now_ms);
        let txn = SyncTransaction::new(&conflict.player_id, &backup.id, now_ms);
        self.transactions
            .write()
            .insert(txn.id.clone(), backup.id.clone());

        let mut working = record;
        let resolution = ConflictResolution {
            field: conflict.field.clone(),
            strategy: request.strategy,
            resolved_value,
            resolved_at_ms: now_ms,
        };
        apply_resolution(&mut working, &resolution)
            .map_err(|e| EngineError::InvalidResolution(e.to_string()))?;

        match self.store.save(&working) {
            Ok(()) => {
                // Server-wins dismisses the client's value: record that as
                // a rejection rather than a resolution.
                let status = if request.strategy == ResolutionStrategy::ServerWins {
                    ConflictStatus::Rejected
                } else {
                    ConflictStatus::Resolved
                };
                self.history.mark(&conflict.id, status);
                info!(player = %working.player_id, conflict = %conflict.id, strategy = ?request.strategy, "conflict resolved manually");
                Ok(working)
            }
            Err(error) => {
                self.restore(&txn)?;
                Err(error)
            }
        }
    }

    /// Restores a player's record from the backup recorded for a
    /// transaction. Operator-triggered recovery after the fact; also
    /// accepts a raw backup id.
    pub fn rollback_transaction(&self, transaction_id: &str) -> EngineResult<PlayerRecord> {
        let backup_id = self
            .transactions
            .read()
            .get(transaction_id)
            .cloned()
            .unwrap_or_else(|| transaction_id.to_string());
        let backup = self
            .backups
            .get(&backup_id)
            .ok_or_else(|| EngineError::UnknownTransaction(transaction_id.to_string()))?;

        self.store.save(&backup.snapshot)?;
        info!(player = %backup.player_id, backup = %backup.id, "rolled back from backup");
        Ok(backup.snapshot)
    }

    /// Reports a player's sync status.
    pub fn status(&self, player_id: &str) -> EngineResult<SyncStatus> {
        let last_sync_ms = self
            .store
            .load(player_id)?
            .map(|record| record.last_sync_ms)
            .unwrap_or(0);

        Ok(SyncStatus {
            player_id: player_id.to_string(),
            last_sync_ms,
            pending_conflicts: self.history.pending_count(player_id),
            sync_in_progress: self.in_flight.lock().contains(player_id),
        })
    }

    /// Returns a player's conflict history, most recent first.
    pub fn conflicts(&self, player_id: &str, limit: usize, offset: usize) -> Vec<DataConflict> {
        self.history.list(player_id, limit, offset)
    }

    /// Runs retention cleanup over backups and history. Returns the number
    /// of entries removed.
    pub fn cleanup(&self, now_ms: u64) -> usize {
        let backups = self.backups.cleanup(now_ms);
        let history = self.history.cleanup(now_ms);
        if backups + history > 0 {
            debug!(backups, history, "retention cleanup");
        }
        backups + history
    }

    fn restore(&self, txn: &SyncTransaction) -> EngineResult<PlayerRecord> {
        let backup = self.backups.get(&txn.backup_id).ok_or_else(|| {
            EngineError::Internal(format!(
                "backup {} missing for transaction {}",
                txn.backup_id, txn.id
            ))
        })?;
        self.store.save(&backup.snapshot)?;
        Ok(backup.snapshot)
    }
}

/// Diffs the server record against the client view.
///
/// A field conflicts when the server side changed after the client's last
/// sync and the two values differ; a client that is simply ahead of an
/// unchanged server is normal offline progress, not a conflict.
fn detect_conflicts(
    request: &SyncRequest,
    record: &PlayerRecord,
    now_ms: u64,
) -> Vec<DataConflict> {
    let mut conflicts = Vec::new();

    if record.step_data.last_updated_ms > request.last_sync_ms
        && record.step_data.total_steps != request.step_data.total_steps
    {
        conflicts.push(DataConflict::new(
            &request.player_id,
            FIELD_STEP_COUNT,
            json!(request.step_data.total_steps),
            json!(record.step_data.total_steps),
            request.last_sync_ms,
            now_ms,
        ));
    }

    if let Some(client_resources) = &request.resources {
        if record.last_sync_ms > request.last_sync_ms && *client_resources != record.resources {
            conflicts.push(DataConflict::new(
                &request.player_id,
                FIELD_RESOURCES,
                json!({
                    "cells": client_resources.cells,
                    "experiencePoints": client_resources.experience_points,
                }),
                json!({
                    "cells": record.resources.cells,
                    "experiencePoints": record.resources.experience_points,
                }),
                request.last_sync_ms,
                now_ms,
            ));
        }
    }

    conflicts
}

/// Writes a resolution into the working record.
fn apply_resolution(
    record: &mut PlayerRecord,
    resolution: &ConflictResolution,
) -> EngineResult<()> {
    match resolution.field.as_str() {
        FIELD_STEP_COUNT => {
            let value = resolution.resolved_value.as_i64().ok_or_else(|| {
                EngineError::Internal("non-numeric stepCount resolution".into())
            })?;
            record.step_data.total_steps = value;
        }
        FIELD_RESOURCES => {
            let resources: PlayerResources =
                serde_json::from_value(resolution.resolved_value.clone()).map_err(|e| {
                    EngineError::Internal(format!("malformed resources resolution: {e}"))
                })?;
            record.resources = resources;
        }
        other => {
            return Err(EngineError::Internal(format!(
                "no applier for field {other}"
            )));
        }
    }
    Ok(())
}

/// Folds the client's step sample into the working record.
///
/// Totals only move forward; the daily counter and sample metadata follow
/// the newer sample.
fn reconcile_steps(record: &mut PlayerRecord, client: &StepData) {
    if client.total_steps > record.step_data.total_steps {
        record.step_data.total_steps = client.total_steps;
    }
    if client.last_updated_ms >= record.step_data.last_updated_ms {
        record.step_data.daily_steps = client.daily_steps;
        record.step_data.last_updated_ms = client.last_updated_ms;
        record.step_data.source = client.source;
        record.step_data.validated = client.validated;
    }
}

/// Applies one queued operation. Errors are soft per-operation failures.
fn apply_operation(record: &mut PlayerRecord, operation: &SyncOperation) -> Result<(), String> {
    match &operation.payload {
        OperationPayload::StepUpdate {
            total_steps,
            daily_steps,
            recorded_at_ms,
        } => {
            if *total_steps < 0 || *daily_steps < 0 {
                return Err("negative step count in sample".into());
            }
            let sample = StepData::new(*total_steps, *daily_steps, *recorded_at_ms);
            reconcile_steps(record, &sample);
            Ok(())
        }
        OperationPayload::ModeSwitch { mode } => {
            record.mode = *mode;
            Ok(())
        }
        OperationPayload::CellInspect { cell_id } => {
            if record.resources.cells == 0 {
                return Err(format!("no discovered cells to inspect ({cell_id})"));
            }
            record.stepling_count += 1;
            record.resources.experience_points += CELL_INSPECT_XP;
            Ok(())
        }
        OperationPayload::SteplingFusion {
            base_id,
            material_id,
        } => {
            if base_id == material_id {
                return Err("cannot fuse a stepling with itself".into());
            }
            if record.stepling_count < 2 {
                return Err("fusion requires at least two steplings".into());
            }
            record.stepling_count -= 1;
            record.resources.experience_points += FUSION_XP;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPlayerStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stepsync_protocol::{PlayMode, STALENESS_WINDOW_MS};

    const NOW: u64 = STALENESS_WINDOW_MS * 20;

    fn orchestrator() -> SyncOrchestrator<MemoryPlayerStore> {
        SyncOrchestrator::new(Arc::new(MemoryPlayerStore::new()))
    }

    fn request(player_id: &str, total: i64, daily: i64, last_sync_ms: u64) -> SyncRequest {
        SyncRequest {
            player_id: player_id.into(),
            step_data: StepData::new(total, daily, NOW - 1000),
            operations: Vec::new(),
            last_sync_ms,
            resources: None,
        }
    }

    #[test]
    fn happy_path_credits_cells() {
        let orchestrator = orchestrator();

        let response = orchestrator
            .sync_at(request("player-1", 1000, 500, NOW - 1000), NOW)
            .unwrap();

        assert!(response.success);
        assert_eq!(response.earned.cells, 1);
        assert_eq!(response.earned.experience_points, 10);
        assert!(response.conflicts.is_empty());

        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.step_data.total_steps, 1000);
        assert_eq!(record.resources.cells, 1);
    }

    #[test]
    fn identical_resync_credits_nothing() {
        let orchestrator = orchestrator();
        let req = request("player-1", 1000, 500, NOW - 1000);

        let first = orchestrator.sync_at(req.clone(), NOW).unwrap();
        assert_eq!(first.earned.cells, 1);

        let second = orchestrator.sync_at(req, NOW + 10).unwrap();
        assert!(second.success);
        assert_eq!(second.earned.cells, 0);
        assert_eq!(second.earned.experience_points, 0);

        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.resources.cells, 1);
    }

    #[test]
    fn validation_failure_mutates_nothing() {
        let orchestrator = orchestrator();

        let result = orchestrator.sync_at(request("player-1", 70_000, 60_000, NOW), NOW);
        match result {
            Err(EngineError::Validation { report }) => {
                assert_eq!(report.errors[0].code(), "EXCESSIVE_STEPS");
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert!(orchestrator.store.load("player-1").unwrap().is_none());
        assert!(orchestrator.backups().is_empty());
    }

    #[test]
    fn fresh_step_conflict_resolves_client_wins() {
        let orchestrator = orchestrator();
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(7500, 100, NOW - 500);
        server.last_sync_ms = NOW - 400;
        orchestrator.store.save(&server).unwrap();

        let response = orchestrator
            .sync_at(request("player-1", 8000, 200, NOW - 1000), NOW)
            .unwrap();

        assert!(response.success);
        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.step_data.total_steps, 8000);
        // The resolved conflict is recorded in history.
        let history = orchestrator.conflicts("player-1", 10, 0);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ConflictStatus::Resolved);
    }

    #[test]
    fn unresolvable_conflict_blocks_and_leaves_record_unchanged() {
        let orchestrator = SyncOrchestrator::new(Arc::new(MemoryPlayerStore::new()))
            .with_resolver(ConflictResolver::empty());
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(7500, 100, NOW - 500);
        server.last_sync_ms = NOW - 400;
        orchestrator.store.save(&server).unwrap();

        let response = orchestrator
            .sync_at(request("player-1", 8000, 200, NOW - 1000), NOW)
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.conflicts[0].field, FIELD_STEP_COUNT);
        assert_eq!(
            response.errors,
            vec!["Conflicts detected that require manual resolution".to_string()]
        );

        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record, server);
        assert_eq!(orchestrator.history().pending_count("player-1"), 1);
    }

    #[test]
    fn concurrent_sync_for_same_player_rejected() {
        let orchestrator = orchestrator();
        orchestrator.in_flight.lock().insert("player-1".to_string());

        let response = orchestrator
            .sync_at(request("player-1", 10, 10, NOW), NOW)
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.errors, vec!["Sync already in progress".to_string()]);

        // A different player is unaffected.
        let response = orchestrator
            .sync_at(request("player-2", 10, 10, NOW), NOW)
            .unwrap();
        assert!(response.success);
    }

    #[test]
    fn in_flight_slot_released_after_sync() {
        let orchestrator = orchestrator();

        orchestrator
            .sync_at(request("player-1", 10, 10, NOW), NOW)
            .unwrap();
        assert!(!orchestrator.status("player-1").unwrap().sync_in_progress);

        // A second sync proceeds normally.
        let response = orchestrator
            .sync_at(request("player-1", 20, 10, NOW), NOW + 1)
            .unwrap();
        assert!(response.success);
    }

    #[test]
    fn operations_apply_in_submission_order() {
        let orchestrator = orchestrator();
        let mut server = PlayerRecord::new("player-1");
        server.resources.cells = 2;
        orchestrator.store.save(&server).unwrap();

        let mut req = request("player-1", 0, 0, NOW - 1000);
        req.operations = vec![
            SyncOperation::new(
                "op-1",
                "player-1",
                NOW - 900,
                OperationPayload::CellInspect {
                    cell_id: "cell-1".into(),
                },
            ),
            SyncOperation::new(
                "op-2",
                "player-1",
                NOW - 800,
                OperationPayload::CellInspect {
                    cell_id: "cell-2".into(),
                },
            ),
            // Depends on the two inspections above having hatched steplings.
            SyncOperation::new(
                "op-3",
                "player-1",
                NOW - 700,
                OperationPayload::SteplingFusion {
                    base_id: "s-1".into(),
                    material_id: "s-2".into(),
                },
            ),
        ];

        let response = orchestrator.sync_at(req, NOW).unwrap();
        assert!(response.success);
        assert!(response.failed_operations.is_empty());

        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.stepling_count, 1);
        assert_eq!(
            record.resources.experience_points,
            CELL_INSPECT_XP * 2 + FUSION_XP
        );
    }

    #[test]
    fn failed_operation_is_soft() {
        let orchestrator = orchestrator();

        let mut req = request("player-1", 100, 100, NOW - 1000);
        req.operations = vec![
            // Fails: no steplings yet.
            SyncOperation::new(
                "op-1",
                "player-1",
                NOW - 900,
                OperationPayload::SteplingFusion {
                    base_id: "s-1".into(),
                    material_id: "s-2".into(),
                },
            ),
            SyncOperation::mode_switch("op-2", "player-1", NOW - 800, PlayMode::Training),
        ];

        let response = orchestrator.sync_at(req, NOW).unwrap();
        assert!(response.success);
        assert_eq!(response.failed_operations.len(), 1);
        assert_eq!(response.failed_operations[0].operation_id, "op-1");

        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.mode, PlayMode::Training);
    }

    #[test]
    fn replayed_operation_id_is_noop() {
        let orchestrator = orchestrator();
        let mut server = PlayerRecord::new("player-1");
        server.resources.cells = 1;
        orchestrator.store.save(&server).unwrap();

        let mut req = request("player-1", 0, 0, NOW - 1000);
        req.operations = vec![SyncOperation::new(
            "op-1",
            "player-1",
            NOW - 900,
            OperationPayload::CellInspect {
                cell_id: "cell-1".into(),
            },
        )];

        orchestrator.sync_at(req.clone(), NOW).unwrap();
        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.stepling_count, 1);

        // Same operation id submitted again: skipped, not re-applied.
        let response = orchestrator.sync_at(req, NOW + 10).unwrap();
        assert!(response.success);
        assert!(response.failed_operations.is_empty());
        let record = orchestrator.store.load("player-1").unwrap().unwrap();
        assert_eq!(record.stepling_count, 1);
    }

    #[test]
    fn last_sync_is_strictly_monotonic() {
        let orchestrator = orchestrator();

        orchestrator
            .sync_at(request("player-1", 10, 10, NOW), NOW)
            .unwrap();
        let first = orchestrator.store.load("player-1").unwrap().unwrap().last_sync_ms;

        // Even with a non-advancing clock the committed timestamp moves.
        orchestrator
            .sync_at(request("player-1", 20, 10, NOW), NOW)
            .unwrap();
        let second = orchestrator.store.load("player-1").unwrap().unwrap().last_sync_ms;
        assert!(second > first);
    }

    /// Store wrapper that fails a configured number of saves.
    struct FailingStore {
        inner: MemoryPlayerStore,
        failures_left: AtomicUsize,
    }

    impl FailingStore {
        fn failing(times: usize) -> Self {
            Self {
                inner: MemoryPlayerStore::new(),
                failures_left: AtomicUsize::new(times),
            }
        }
    }

    impl PlayerStore for FailingStore {
        fn load(&self, player_id: &str) -> EngineResult<Option<PlayerRecord>> {
            self.inner.load(player_id)
        }

        fn save(&self, record: &PlayerRecord) -> EngineResult<()> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(EngineError::Storage("induced write failure".into()));
            }
            self.inner.save(record)
        }
    }

    #[test]
    fn rollback_restores_presync_snapshot_exactly() {
        let store = Arc::new(FailingStore::failing(0));
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(500, 100, NOW - 5000);
        server.resources = PlayerResources::new(3, 70);
        server.last_sync_ms = NOW - 4000;
        store.save(&server).unwrap();

        // Fail the commit save; the restore save succeeds.
        store.failures_left.store(1, Ordering::SeqCst);
        let orchestrator = SyncOrchestrator::new(Arc::clone(&store));

        let response = orchestrator
            .sync_at(request("player-1", 2000, 300, NOW - 1000), NOW)
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.errors.len(), 1);

        let record = store.load("player-1").unwrap().unwrap();
        assert_eq!(record, server);
    }

    #[test]
    fn rollback_transaction_restores_named_backup() {
        let orchestrator = orchestrator();
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(100, 10, NOW - 5000);
        orchestrator.store.save(&server).unwrap();

        orchestrator
            .sync_at(request("player-1", 900, 10, NOW - 1000), NOW)
            .unwrap();
        assert_eq!(
            orchestrator
                .store
                .load("player-1")
                .unwrap()
                .unwrap()
                .step_data
                .total_steps,
            900
        );

        // The pre-sync backup is the latest; roll back to it by backup id.
        let backup = orchestrator.backups().latest_for("player-1").unwrap();
        let restored = orchestrator.rollback_transaction(&backup.id).unwrap();
        assert_eq!(restored.step_data.total_steps, 100);
        assert_eq!(
            orchestrator
                .store
                .load("player-1")
                .unwrap()
                .unwrap()
                .step_data
                .total_steps,
            100
        );
    }

    #[test]
    fn rollback_unknown_transaction_fails() {
        let orchestrator = orchestrator();
        let result = orchestrator.rollback_transaction("no-such-txn");
        assert!(matches!(result, Err(EngineError::UnknownTransaction(_))));
    }

    #[test]
    fn manual_resolution_applies_and_marks_history() {
        let orchestrator = SyncOrchestrator::new(Arc::new(MemoryPlayerStore::new()))
            .with_resolver(ConflictResolver::empty());
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(7500, 100, NOW - 500);
        server.last_sync_ms = NOW - 400;
        orchestrator.store.save(&server).unwrap();

        let blocked = orchestrator
            .sync_at(request("player-1", 8000, 200, NOW - 1000), NOW)
            .unwrap();
        let conflict_id = blocked.conflicts[0].id.clone();

        let record = orchestrator
            .resolve_conflict_at(
                &ResolveConflictRequest {
                    conflict_id: conflict_id.clone(),
                    strategy: ResolutionStrategy::ClientWins,
                    resolved_value: None,
                },
                NOW + 10,
            )
            .unwrap();

        assert_eq!(record.step_data.total_steps, 8000);
        assert_eq!(
            orchestrator.history().get(&conflict_id).unwrap().status,
            ConflictStatus::Resolved
        );
        assert_eq!(orchestrator.history().pending_count("player-1"), 0);
    }

    #[test]
    fn manual_server_wins_marks_rejected() {
        let orchestrator = SyncOrchestrator::new(Arc::new(MemoryPlayerStore::new()))
            .with_resolver(ConflictResolver::empty());
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(7500, 100, NOW - 500);
        server.last_sync_ms = NOW - 400;
        orchestrator.store.save(&server).unwrap();

        let blocked = orchestrator
            .sync_at(request("player-1", 8000, 200, NOW - 1000), NOW)
            .unwrap();
        let conflict_id = blocked.conflicts[0].id.clone();

        let record = orchestrator
            .resolve_conflict_at(
                &ResolveConflictRequest {
                    conflict_id: conflict_id.clone(),
                    strategy: ResolutionStrategy::ServerWins,
                    resolved_value: None,
                },
                NOW + 10,
            )
            .unwrap();

        assert_eq!(record.step_data.total_steps, 7500);
        assert_eq!(
            orchestrator.history().get(&conflict_id).unwrap().status,
            ConflictStatus::Rejected
        );
    }

    #[test]
    fn resolve_unknown_conflict_fails() {
        let orchestrator = orchestrator();
        let result = orchestrator.resolve_conflict_at(
            &ResolveConflictRequest {
                conflict_id: "missing".into(),
                strategy: ResolutionStrategy::ClientWins,
                resolved_value: None,
            },
            NOW,
        );
        assert!(matches!(result, Err(EngineError::UnknownConflict(_))));
    }

    #[test]
    fn status_reports_pending_conflicts() {
        let orchestrator = SyncOrchestrator::new(Arc::new(MemoryPlayerStore::new()))
            .with_resolver(ConflictResolver::empty());
        let mut server = PlayerRecord::new("player-1");
        server.step_data = StepData::new(7500, 100, NOW - 500);
        server.last_sync_ms = NOW - 400;
        orchestrator.store.save(&server).unwrap();

        orchestrator
            .sync_at(request("player-1", 8000, 200, NOW - 1000), NOW)
            .unwrap();

        let status = orchestrator.status("player-1").unwrap();
        assert_eq!(status.pending_conflicts, 1);
        assert!(!status.sync_in_progress);
        assert_eq!(status.last_sync_ms, NOW - 400);
    }

    #[test]
    fn applied_ledger_is_bounded() {
        let mut ledger = AppliedLedger::new(3);
        for i in 0..5 {
            ledger.insert(format!("op-{i}"));
        }

        assert!(!ledger.contains("op-0"));
        assert!(!ledger.contains("op-1"));
        assert!(ledger.contains("op-2"));
        assert!(ledger.contains("op-4"));
        assert_eq!(ledger.order.len(), 3);
    }

    #[test]
    fn detect_conflicts_ignores_plain_offline_progress() {
        // Server unchanged since the client's last sync: no conflict.
        let record = PlayerRecord::new("player-1");
        let req = request("player-1", 1000, 100, NOW - 1000);
        assert!(detect_conflicts(&req, &record, NOW).is_empty());
    }

    #[test]
    fn detect_conflicts_sees_resource_divergence() {
        let mut record = PlayerRecord::new("player-1");
        record.resources = PlayerResources::new(4, 90);
        record.last_sync_ms = NOW - 100;

        let mut req = request("player-1", 0, 0, NOW - 1000);
        req.resources = Some(PlayerResources::new(6, 80));

        let conflicts = detect_conflicts(&req, &record, NOW);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, FIELD_RESOURCES);
    }

    #[test]
    fn phase_terminality() {
        assert!(SyncPhase::Committed.is_terminal());
        assert!(SyncPhase::RolledBack.is_terminal());
        assert!(SyncPhase::Blocked.is_terminal());
        assert!(!SyncPhase::Applying.is_terminal());
        assert!(!SyncPhase::Idle.is_terminal());
    }

    #[test]
    fn cleanup_sweeps_backups_and_history() {
        let orchestrator = orchestrator();

        orchestrator
            .sync_at(request("player-1", 10, 10, NOW), NOW)
            .unwrap();
        orchestrator
            .sync_at(request("player-1", 20, 10, NOW), NOW)
            .unwrap();
        assert_eq!(orchestrator.backups().len(), 2);

        // Far in the future, only the latest backup survives.
        let removed = orchestrator.cleanup(NOW + STALENESS_WINDOW_MS * 2);
        assert_eq!(removed, 1);
        assert_eq!(orchestrator.backups().len(), 1);
    }

    #[test]
    fn synced_days_counts_whole_days() {
        let orchestrator = orchestrator();
        let mut server = PlayerRecord::new("player-1");
        server.last_sync_ms = NOW - 3 * DAY_MS - 1000;
        orchestrator.store.save(&server).unwrap();

        let response = orchestrator
            .sync_at(request("player-1", 10, 10, NOW - 1000), NOW)
            .unwrap();
        assert_eq!(response.synced_days, 3);
    }
}
