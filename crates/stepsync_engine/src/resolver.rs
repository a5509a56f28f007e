//! Per-field conflict resolution policies.

use std::collections::HashMap;
use stepsync_protocol::{
    merge_numeric_max, ConflictResolution, DataConflict, ResolutionStrategy, STALENESS_WINDOW_MS,
    FIELD_RESOURCES, FIELD_STEP_COUNT,
};

/// Resolution policy for one syncable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// The client's value wins while the conflict is younger than the
    /// window; afterwards the server's value stands.
    ClientWinsWithin {
        /// Age limit for trusting the client's value.
        window_ms: u64,
    },
    /// Component-wise numeric maximum of both values.
    MergeMax,
    /// The server's value always stands.
    ServerWins,
    /// Never resolved automatically.
    Manual,
}

/// Decides a strategy and resolved value for each conflicting field.
///
/// The policy table is declarative: adding a syncable field means
/// registering a policy, not changing control flow. Fields with no
/// registered policy surface as `ManualReview` and block the sync;
/// unknown client-submitted state is never trusted silently.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    policies: HashMap<String, FieldPolicy>,
}

impl ConflictResolver {
    /// Creates a resolver with an empty policy table (everything manual).
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Creates a resolver with the standard policy table:
    /// `stepCount` → client wins within the staleness window,
    /// `resources` → component-wise maximum merge.
    pub fn new() -> Self {
        Self::empty()
            .with_policy(
                FIELD_STEP_COUNT,
                FieldPolicy::ClientWinsWithin {
                    window_ms: STALENESS_WINDOW_MS,
                },
            )
            .with_policy(FIELD_RESOURCES, FieldPolicy::MergeMax)
    }

    /// Registers (or replaces) the policy for a field.
    pub fn with_policy(mut self, field: impl Into<String>, policy: FieldPolicy) -> Self {
        self.policies.insert(field.into(), policy);
        self
    }

    /// Returns the policy registered for a field, if any.
    pub fn policy_for(&self, field: &str) -> Option<FieldPolicy> {
        self.policies.get(field).copied()
    }

    /// Resolves one conflict.
    ///
    /// Deterministic given the conflict and `now_ms`; never mutates state.
    pub fn resolve(&self, conflict: &DataConflict, now_ms: u64) -> ConflictResolution {
        let (strategy, resolved_value) = match self.policy_for(&conflict.field) {
            Some(FieldPolicy::ClientWinsWithin { window_ms }) => {
                if now_ms.saturating_sub(conflict.detected_at_ms) <= window_ms {
                    (ResolutionStrategy::ClientWins, conflict.local_value.clone())
                } else {
                    (ResolutionStrategy::ServerWins, conflict.server_value.clone())
                }
            }
            Some(FieldPolicy::MergeMax) => (
                ResolutionStrategy::MergeValues,
                merge_numeric_max(&conflict.local_value, &conflict.server_value),
            ),
            Some(FieldPolicy::ServerWins) => {
                (ResolutionStrategy::ServerWins, conflict.server_value.clone())
            }
            Some(FieldPolicy::Manual) | None => (
                ResolutionStrategy::ManualReview,
                conflict.server_value.clone(),
            ),
        };

        ConflictResolution {
            field: conflict.field.clone(),
            strategy,
            resolved_value,
            resolved_at_ms: now_ms,
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}
