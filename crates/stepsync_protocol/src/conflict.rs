//! Conflict detection and resolution types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Wire name of the step-count field.
pub const FIELD_STEP_COUNT: &str = "stepCount";
/// Wire name of the resources field.
pub const FIELD_RESOURCES: &str = "resources";

/// Lifecycle state of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    /// Detected, not yet resolved.
    Pending,
    /// Resolved automatically or manually.
    Resolved,
    /// The client's value was dismissed in favor of the server's.
    Rejected,
}

/// A detected divergence between the client's and server's values for one
/// named field.
///
/// Never mutated after resolution except to record the resolution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConflict {
    /// Unique conflict id.
    pub id: String,
    /// The player whose state diverged.
    pub player_id: String,
    /// Name of the conflicting field (`stepCount`, `resources`, ...).
    pub field: String,
    /// The client's value.
    pub local_value: Value,
    /// The server's authoritative value.
    pub server_value: Value,
    /// The client's last successful sync before the divergence.
    #[serde(rename = "lastSyncTimestamp")]
    pub last_sync_ms: u64,
    /// When the divergence was detected.
    #[serde(rename = "conflictTimestamp")]
    pub detected_at_ms: u64,
    /// Lifecycle state.
    pub status: ConflictStatus,
}

impl DataConflict {
    /// Creates a pending conflict with a fresh id.
    pub fn new(
        player_id: impl Into<String>,
        field: impl Into<String>,
        local_value: Value,
        server_value: Value,
        last_sync_ms: u64,
        detected_at_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            player_id: player_id.into(),
            field: field.into(),
            local_value,
            server_value,
            last_sync_ms,
            detected_at_ms,
            status: ConflictStatus::Pending,
        }
    }

    /// Returns true if the conflict has not been resolved yet.
    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }
}

/// How a conflicting field is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    /// The server's value stands.
    ServerWins,
    /// The client's value replaces the server's.
    ClientWins,
    /// Merge the two values (component-wise maximum for resources).
    MergeValues,
    /// No automatic policy applies; a human or explicit client call must
    /// decide.
    ManualReview,
}

impl ResolutionStrategy {
    /// Returns true if this strategy resolves without manual input.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, ResolutionStrategy::ManualReview)
    }
}

/// The outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    /// The field that was resolved.
    pub field: String,
    /// The strategy that produced the value.
    pub strategy: ResolutionStrategy,
    /// The value to write to the authoritative record.
    pub resolved_value: Value,
    /// When the resolution was produced.
    #[serde(rename = "timestamp")]
    pub resolved_at_ms: u64,
}

/// Merges two JSON values by taking the component-wise numeric maximum.
///
/// Objects are merged key by key (recursively); a key present on only one
/// side is kept as-is. Two numbers yield the maximum. Anything else falls
/// back to the server value, which is authoritative for non-mergeable
/// shapes.
pub fn merge_numeric_max(local: &Value, server: &Value) -> Value {
    match (local, server) {
        (Value::Object(l), Value::Object(s)) => {
            let mut merged = s.clone();
            for (key, local_value) in l {
                let entry = match s.get(key) {
                    Some(server_value) => merge_numeric_max(local_value, server_value),
                    None => local_value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        (Value::Number(l), Value::Number(s)) => {
            if let (Some(l), Some(s)) = (l.as_i64(), s.as_i64()) {
                return Value::from(l.max(s));
            }
            if let (Some(l), Some(s)) = (l.as_u64(), s.as_u64()) {
                return Value::from(l.max(s));
            }
            match (l.as_f64(), s.as_f64()) {
                (Some(lf), Some(sf)) if lf > sf => Value::Number(l.clone()),
                _ => Value::Number(s.clone()),
            }
        }
        _ => server.clone(),
    }
}
