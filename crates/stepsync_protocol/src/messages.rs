//! Wire request/response messages for the sync endpoints.

use crate::conflict::{DataConflict, ResolutionStrategy};
use crate::operation::SyncOperation;
use crate::player::{PlayerRecord, PlayerResources, StepData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum age of offline data eligible for automatic sync (7 days).
pub const STALENESS_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Maximum number of operations a single sync request may carry.
pub const MAX_PENDING_OPERATIONS: usize = 1000;

/// Request body for `POST /sync/player-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// The player being synced.
    pub player_id: String,
    /// The client's current step sample.
    pub step_data: StepData,
    /// Offline-accumulated operations, in submission order.
    #[serde(default)]
    pub operations: Vec<SyncOperation>,
    /// The client's last successful sync (Unix milliseconds).
    #[serde(rename = "lastSync")]
    pub last_sync_ms: u64,
    /// The client's local resource view, if it tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PlayerResources>,
}

/// An operation that failed individually during apply.
///
/// Per-operation failures are soft: they are reported here without aborting
/// the sync, and the client re-queues only these ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailure {
    /// Id of the failed operation.
    pub operation_id: String,
    /// Why it failed.
    pub error: String,
}

/// Response body for `POST /sync/player-data`: the only object returned
/// across the client/server boundary for a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Whether the sync committed.
    pub success: bool,
    /// Whole days covered by this sync window.
    pub synced_days: u32,
    /// Errors, verbatim for the caller.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Conflicts requiring manual resolution (blocked sync only).
    #[serde(default)]
    pub conflicts: Vec<DataConflict>,
    /// Operations that failed individually.
    #[serde(default)]
    pub failed_operations: Vec<OperationFailure>,
    /// Resources credited by this sync.
    #[serde(default)]
    pub earned: PlayerResources,
    /// The player's committed last-sync timestamp after this request.
    #[serde(rename = "lastSyncDate")]
    pub last_sync_ms: u64,
    /// Server time when the response was produced.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl SyncResponse {
    /// A committed sync.
    pub fn committed(
        synced_days: u32,
        failed_operations: Vec<OperationFailure>,
        earned: PlayerResources,
        last_sync_ms: u64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            success: true,
            synced_days,
            errors: Vec::new(),
            conflicts: Vec::new(),
            failed_operations,
            earned,
            last_sync_ms,
            timestamp_ms,
        }
    }

    /// A sync blocked on conflicts that require manual resolution.
    pub fn blocked(conflicts: Vec<DataConflict>, last_sync_ms: u64, timestamp_ms: u64) -> Self {
        Self {
            success: false,
            synced_days: 0,
            errors: vec!["Conflicts detected that require manual resolution".to_string()],
            conflicts,
            failed_operations: Vec::new(),
            earned: PlayerResources::default(),
            last_sync_ms,
            timestamp_ms,
        }
    }

    /// A sync that did not run or did not commit, with a reason.
    pub fn failure(error: impl Into<String>, last_sync_ms: u64, timestamp_ms: u64) -> Self {
        Self {
            success: false,
            synced_days: 0,
            errors: vec![error.into()],
            conflicts: Vec::new(),
            failed_operations: Vec::new(),
            earned: PlayerResources::default(),
            last_sync_ms,
            timestamp_ms,
        }
    }
}

/// Request body for `POST /sync/resolve-conflict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// The pending conflict to resolve.
    pub conflict_id: String,
    /// The strategy chosen by the caller.
    pub strategy: ResolutionStrategy,
    /// Explicit value override; when absent the strategy derives the value
    /// from the conflict's recorded sides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<Value>,
}

/// Response body for `POST /sync/resolve-conflict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictResponse {
    /// Whether the resolution was applied.
    pub success: bool,
    /// The player record after the resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PlayerRecord>,
    /// Error message if the resolution was not applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolveConflictResponse {
    /// A successfully applied resolution.
    pub fn applied(record: PlayerRecord) -> Self {
        Self {
            success: true,
            data: Some(record),
            error: None,
        }
    }

    /// A failed resolution.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Response body for `GET /sync/status/:playerId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// The player queried.
    pub player_id: String,
    /// Last committed sync (Unix milliseconds); 0 if never synced.
    #[serde(rename = "lastSync")]
    pub last_sync_ms: u64,
    /// Number of conflicts awaiting manual resolution.
    pub pending_conflicts: usize,
    /// Whether a sync is currently in flight for this player.
    pub sync_in_progress: bool,
}

/// Response body for `POST /sync/rollback/:transactionId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResponse {
    /// Whether the restore was applied.
    pub success: bool,
    /// Error message if the restore failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollbackResponse {
    /// A successful restore.
    pub fn applied() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed restore.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Error body used by 4xx/5xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code from the validation taxonomy.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
