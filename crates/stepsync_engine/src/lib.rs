//! # StepSync Engine
//!
//! Server-side reconciliation engine for StepSync.
//!
//! This crate provides:
//! - Request validation against sanity thresholds
//! - Conflict detection and per-field resolution policies
//! - Pre-sync backups with restore/rollback
//! - Append-only conflict history
//! - The transactional sync orchestrator (state machine)
//!
//! ## Architecture
//!
//! A sync is one mostly-sequential transaction:
//! 1. Validate the request (pure, fail closed)
//! 2. Snapshot the authoritative record (backup before any mutation)
//! 3. Detect and resolve conflicts, or abort and surface them
//! 4. Apply queued operations in submission order
//! 5. Commit, or restore from the backup on any failure
//!
//! ## Key Invariants
//!
//! - The authoritative record is mutated only under the per-player sync lock
//! - A backup is taken before any mutation, so every failure is recoverable
//! - `last_sync` is strictly monotonically increasing per player
//! - Re-submitted operation ids are no-ops (bounded idempotency ledger)
//! - Resource credits derive from step deltas, so replay credits zero

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
mod error;
mod history;
mod orchestrator;
mod resolver;
mod store;
mod validator;

pub use backup::{BackupData, BackupKind, BackupStore, BACKUP_RETENTION_MS};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use history::ConflictHistoryStore;
pub use orchestrator::{SyncOrchestrator, SyncPhase, SyncTransaction};
pub use resolver::{ConflictResolver, FieldPolicy};
pub use store::{MemoryPlayerStore, PlayerStore};
pub use validator::{
    validate, ValidationError, ValidationReport, ValidationWarning, DATA_GAP_MS,
    MAX_DAILY_STEPS_ABSOLUTE, MAX_DAILY_STEPS_CLIENT, MAX_TOTAL_STEPS_ABSOLUTE,
    SUSPICIOUS_DAILY_STEPS,
};
