//! Queued sync operations.

use crate::player::PlayMode;
use serde::{Deserialize, Serialize};

/// The typed payload of a sync operation.
///
/// Exactly four operation kinds exist; a body with any other `type` tag
/// fails to decode at the wire boundary, so an unknown kind never reaches
/// the engine as a runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationPayload {
    /// A step-count sample recorded while offline.
    StepUpdate {
        /// Lifetime total at the time of the sample.
        #[serde(rename = "totalSteps")]
        total_steps: i64,
        /// Daily count at the time of the sample.
        #[serde(rename = "dailySteps")]
        daily_steps: i64,
        /// When the sample was recorded (Unix milliseconds).
        #[serde(rename = "recordedAt")]
        recorded_at_ms: u64,
    },
    /// The player switched gameplay mode.
    ModeSwitch {
        /// The mode switched to.
        mode: PlayMode,
    },
    /// The player inspected a discovered cell, hatching a stepling.
    CellInspect {
        /// Identity of the inspected cell.
        #[serde(rename = "cellId")]
        cell_id: String,
    },
    /// The player fused two steplings.
    SteplingFusion {
        /// The stepling kept (and strengthened) by the fusion.
        #[serde(rename = "baseId")]
        base_id: String,
        /// The stepling consumed by the fusion.
        #[serde(rename = "materialId")]
        material_id: String,
    },
}

impl OperationPayload {
    /// The wire tag for this payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationPayload::StepUpdate { .. } => "step_update",
            OperationPayload::ModeSwitch { .. } => "mode_switch",
            OperationPayload::CellInspect { .. } => "cell_inspect",
            OperationPayload::SteplingFusion { .. } => "stepling_fusion",
        }
    }
}

/// A discrete client-originated action queued for later application.
///
/// Identity is the client-generated `id`: re-submission of an id that was
/// already applied must be a no-op on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Client-generated unique id.
    pub id: String,
    /// The player this operation belongs to.
    pub player_id: String,
    /// When the operation was performed on the client (Unix milliseconds).
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    /// The typed payload.
    #[serde(flatten)]
    pub payload: OperationPayload,
}

impl SyncOperation {
    /// Creates an operation.
    pub fn new(
        id: impl Into<String>,
        player_id: impl Into<String>,
        timestamp_ms: u64,
        payload: OperationPayload,
    ) -> Self {
        Self {
            id: id.into(),
            player_id: player_id.into(),
            timestamp_ms,
            payload,
        }
    }

    /// Creates a step-update operation.
    pub fn step_update(
        id: impl Into<String>,
        player_id: impl Into<String>,
        timestamp_ms: u64,
        total_steps: i64,
        daily_steps: i64,
    ) -> Self {
        Self::new(
            id,
            player_id,
            timestamp_ms,
            OperationPayload::StepUpdate {
                total_steps,
                daily_steps,
                recorded_at_ms: timestamp_ms,
            },
        )
    }

    /// Creates a mode-switch operation.
    pub fn mode_switch(
        id: impl Into<String>,
        player_id: impl Into<String>,
        timestamp_ms: u64,
        mode: PlayMode,
    ) -> Self {
        Self::new(id, player_id, timestamp_ms, OperationPayload::ModeSwitch { mode })
    }

    /// The wire tag of the payload.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kinds() {
        let op = SyncOperation::step_update("op-1", "p", 100, 1000, 200);
        assert_eq!(op.kind(), "step_update");

        let op = SyncOperation::mode_switch("op-2", "p", 100, PlayMode::Training);
        assert_eq!(op.kind(), "mode_switch");
    }

    #[test]
    fn operation_wire_shape() {
        let op = SyncOperation::new(
            "op-7",
            "player-1",
            42,
            OperationPayload::CellInspect {
                cell_id: "cell-9".into(),
            },
        );

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["id"], "op-7");
        assert_eq!(json["playerId"], "player-1");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["type"], "cell_inspect");
        assert_eq!(json["data"]["cellId"], "cell-9");
    }

    #[test]
    fn operation_roundtrip() {
        let op = SyncOperation::new(
            "op-3",
            "p",
            7,
            OperationPayload::SteplingFusion {
                base_id: "s-1".into(),
                material_id: "s-2".into(),
            },
        );

        let json = serde_json::to_string(&op).unwrap();
        let decoded: SyncOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn unknown_type_tag_is_a_decode_error() {
        let json = r#"{
            "id": "op-1",
            "playerId": "p",
            "timestamp": 0,
            "type": "teleport",
            "data": {}
        }"#;

        let result: Result<SyncOperation, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
