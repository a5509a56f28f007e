//! Player state: step counters, resources, and the authoritative record.

use serde::{Deserialize, Serialize};

/// Where a step sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepSource {
    /// Recorded by the device's step tracker.
    Tracker,
    /// Entered manually by the player.
    Manual,
}

impl Default for StepSource {
    fn default() -> Self {
        StepSource::Tracker
    }
}

/// A step-count sample.
///
/// Counts are `i64` on the wire so that out-of-range submissions stay
/// representable and reach the validator as data rather than decode errors.
/// `daily_steps` resets each calendar day on the client; the engine only
/// validates the values it is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    /// Lifetime step total for the player.
    pub total_steps: i64,
    /// Steps recorded during the current calendar day.
    pub daily_steps: i64,
    /// When this sample was recorded (Unix milliseconds).
    #[serde(rename = "lastUpdated")]
    pub last_updated_ms: u64,
    /// Origin of the sample.
    #[serde(default)]
    pub source: StepSource,
    /// Whether the client's own validation passed for this sample.
    #[serde(default)]
    pub validated: bool,
}

impl StepData {
    /// Creates a sample with zeroed counters.
    pub fn zero() -> Self {
        Self {
            total_steps: 0,
            daily_steps: 0,
            last_updated_ms: 0,
            source: StepSource::Tracker,
            validated: false,
        }
    }

    /// Creates a tracker-sourced sample.
    pub fn new(total_steps: i64, daily_steps: i64, last_updated_ms: u64) -> Self {
        Self {
            total_steps,
            daily_steps,
            last_updated_ms,
            source: StepSource::Tracker,
            validated: false,
        }
    }
}

/// Resource currencies earned through play.
///
/// Resources are monotonically earned; legitimate play never decreases
/// them, which is what makes the component-wise-maximum merge safe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResources {
    /// Discovered cells, the primary currency.
    pub cells: u64,
    /// Accumulated experience points.
    pub experience_points: u64,
}

impl PlayerResources {
    /// Creates a resource bundle.
    pub fn new(cells: u64, experience_points: u64) -> Self {
        Self {
            cells,
            experience_points,
        }
    }

    /// Component-wise maximum of two resource bundles.
    ///
    /// The result is never less than either input in any component.
    pub fn merged_max(&self, other: &PlayerResources) -> PlayerResources {
        PlayerResources {
            cells: self.cells.max(other.cells),
            experience_points: self.experience_points.max(other.experience_points),
        }
    }
}

/// Gameplay mode selected by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Exploring to discover new cells.
    Discovery,
    /// Training the current roster.
    Training,
}

impl Default for PlayMode {
    fn default() -> Self {
        PlayMode::Discovery
    }
}

/// The full per-player sync state.
///
/// The server holds the authoritative copy; the client's durable local view
/// uses the same shape. Only the sync engine mutates the server copy, under
/// the per-player sync lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// Opaque player identity issued by the session service.
    pub player_id: String,
    /// Current step counters.
    pub step_data: StepData,
    /// Current resource balances.
    pub resources: PlayerResources,
    /// Current gameplay mode.
    #[serde(default)]
    pub mode: PlayMode,
    /// Number of steplings in the player's roster.
    #[serde(default)]
    pub stepling_count: u32,
    /// Timestamp of the last committed sync (Unix milliseconds).
    #[serde(rename = "lastSync")]
    pub last_sync_ms: u64,
}

impl PlayerRecord {
    /// Creates a fresh record for a player that has never synced.
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            step_data: StepData::zero(),
            resources: PlayerResources::default(),
            mode: PlayMode::Discovery,
            stepling_count: 0,
            last_sync_ms: 0,
        }
    }
}
