//! # StepSync Protocol
//!
//! Sync protocol types for StepSync.
//!
//! This crate provides:
//! - `PlayerRecord` and its step/resource sub-state
//! - `SyncOperation` as a tagged union over the four operation kinds
//! - `DataConflict` and resolution types
//! - Wire request/response messages for all sync endpoints
//!
//! This is a pure protocol crate with no I/O operations. All messages are
//! JSON-shaped via serde; wire field names use camelCase.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod messages;
mod operation;
mod player;

pub use conflict::{
    merge_numeric_max, ConflictResolution, ConflictStatus, DataConflict, ResolutionStrategy,
    FIELD_RESOURCES, FIELD_STEP_COUNT,
};
pub use messages::{
    ErrorBody, OperationFailure, ResolveConflictRequest, ResolveConflictResponse,
    RollbackResponse, SyncRequest, SyncResponse, SyncStatus, MAX_PENDING_OPERATIONS,
    STALENESS_WINDOW_MS,
};
pub use operation::{OperationPayload, SyncOperation};
pub use player::{PlayMode, PlayerRecord, PlayerResources, StepData, StepSource};

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as Unix milliseconds.
///
/// All protocol timestamps are Unix milliseconds. Pure computations take a
/// `now_ms` argument instead of calling this, so tests control the clock.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
