//! Sync request validation.
//!
//! Validation is pure: it never mutates the request and never fails for
//! malformed-but-representable input; it reports errors instead. Errors
//! make the whole sync fail closed; warnings are informational only.

use crate::config::EngineConfig;
use stepsync_protocol::{OperationPayload, SyncRequest};
use thiserror::Error;

/// Absolute per-request daily-step ceiling.
pub const MAX_DAILY_STEPS_ABSOLUTE: i64 = 100_000;
/// Absolute per-request total-step ceiling.
pub const MAX_TOTAL_STEPS_ABSOLUTE: i64 = 1_000_000;
/// Client-side daily-step ceiling.
pub const MAX_DAILY_STEPS_CLIENT: i64 = 50_000;
/// Daily counts above this are flagged as suspicious (non-blocking).
pub const SUSPICIOUS_DAILY_STEPS: i64 = 30_000;
/// A gap between consecutive step samples longer than this (1.5 days)
/// yields a warning.
pub const DATA_GAP_MS: u64 = 36 * 60 * 60 * 1000;

/// A blocking validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A step count is negative.
    #[error("step counts must be non-negative")]
    NegativeSteps,

    /// A step count exceeds the absolute request-level ceiling.
    #[error("step counts exceed the absolute ceiling (daily {daily_steps}, total {total_steps})")]
    AbsoluteCeilingExceeded {
        /// Submitted daily count.
        daily_steps: i64,
        /// Submitted total count.
        total_steps: i64,
    },

    /// The daily count exceeds the client-side ceiling.
    #[error("daily step count {daily_steps} exceeds the daily ceiling")]
    ExcessiveSteps {
        /// Submitted daily count.
        daily_steps: i64,
    },

    /// The client has been offline longer than the staleness window and
    /// must discard its queue instead of syncing it.
    #[error("last sync is older than the offline limit")]
    OfflineLimitExceeded {
        /// The client's reported last sync.
        last_sync_ms: u64,
    },

    /// The client's reported last sync is in the future.
    #[error("last sync timestamp is in the future")]
    FutureWindow {
        /// The client's reported last sync.
        last_sync_ms: u64,
    },

    /// The request carries more operations than the queue bound allows.
    #[error("operation queue overflow: {count} operations submitted")]
    QueueOverflow {
        /// Number of submitted operations.
        count: usize,
    },

    /// An operation belongs to a different player than the request.
    #[error("operation {operation_id} belongs to another player")]
    CrossPlayerOperation {
        /// Id of the offending operation.
        operation_id: String,
    },
}

impl ValidationError {
    /// The wire error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NegativeSteps => "NEGATIVE_STEPS",
            ValidationError::AbsoluteCeilingExceeded { .. } => "VALIDATION_ERROR",
            ValidationError::ExcessiveSteps { .. } => "EXCESSIVE_STEPS",
            ValidationError::OfflineLimitExceeded { .. } => "OFFLINE_LIMIT_EXCEEDED",
            ValidationError::FutureWindow { .. } => "VALIDATION_ERROR",
            ValidationError::QueueOverflow { .. } => "QUEUE_OVERFLOW",
            ValidationError::CrossPlayerOperation { .. } => "VALIDATION_ERROR",
        }
    }
}

/// A non-blocking validation observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// Daily count is unusually high but within the ceiling.
    SuspiciousActivity {
        /// Submitted daily count.
        daily_steps: i64,
    },
    /// Consecutive step samples are further apart than expected.
    DataGap {
        /// Size of the gap in milliseconds.
        gap_ms: u64,
    },
}

impl ValidationWarning {
    /// The wire warning code for this observation.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationWarning::SuspiciousActivity { .. } => "SUSPICIOUS_ACTIVITY",
            ValidationWarning::DataGap { .. } => "DATA_GAP",
        }
    }
}

/// The outcome of validating one sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Blocking failures.
    pub errors: Vec<ValidationError>,
    /// Informational observations.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// Returns true if no blocking failure was found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// A one-line summary of the error codes, for logs and error messages.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "ok".to_string();
        }
        self.errors
            .iter()
            .map(|e| e.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Validates a sync request against the sanity thresholds.
///
/// `now_ms` is the server's wall clock; callers pass it in so the staleness
/// boundary is testable to the millisecond.
pub fn validate(request: &SyncRequest, now_ms: u64, config: &EngineConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let steps = &request.step_data;

    if steps.total_steps < 0 || steps.daily_steps < 0 {
        report.errors.push(ValidationError::NegativeSteps);
    }

    if steps.daily_steps > MAX_DAILY_STEPS_ABSOLUTE || steps.total_steps > MAX_TOTAL_STEPS_ABSOLUTE
    {
        report.errors.push(ValidationError::AbsoluteCeilingExceeded {
            daily_steps: steps.daily_steps,
            total_steps: steps.total_steps,
        });
    } else if steps.daily_steps > MAX_DAILY_STEPS_CLIENT {
        report.errors.push(ValidationError::ExcessiveSteps {
            daily_steps: steps.daily_steps,
        });
    } else if steps.daily_steps > SUSPICIOUS_DAILY_STEPS {
        report.warnings.push(ValidationWarning::SuspiciousActivity {
            daily_steps: steps.daily_steps,
        });
    }

    if request.last_sync_ms > now_ms {
        report.errors.push(ValidationError::FutureWindow {
            last_sync_ms: request.last_sync_ms,
        });
    } else if now_ms - request.last_sync_ms > config.offline_window_ms {
        report.errors.push(ValidationError::OfflineLimitExceeded {
            last_sync_ms: request.last_sync_ms,
        });
    }

    if request.operations.len() > config.max_operations_per_sync {
        report.errors.push(ValidationError::QueueOverflow {
            count: request.operations.len(),
        });
    }

    for operation in &request.operations {
        if operation.player_id != request.player_id {
            report.errors.push(ValidationError::CrossPlayerOperation {
                operation_id: operation.id.clone(),
            });
        }
    }

    // Gap detection over the chronological sample sequence: last sync,
    // then each step_update in submission order.
    let mut previous_ms = request.last_sync_ms;
    for operation in &request.operations {
        if let OperationPayload::StepUpdate { recorded_at_ms, .. } = operation.payload {
            if recorded_at_ms > previous_ms {
                let gap_ms = recorded_at_ms - previous_ms;
                if gap_ms > DATA_GAP_MS {
                    report.warnings.push(ValidationWarning::DataGap { gap_ms });
                }
                previous_ms = recorded_at_ms;
            }
        }
    }

    report
}
