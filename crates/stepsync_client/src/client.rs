//! The client sync service.

use crate::error::{ClientError, ClientResult};
use crate::queue::{OperationQueue, QueueBackend};
use crate::state::StateBackend;
use crate::transport::SyncTransport;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use stepsync_protocol::{
    PlayerResources, ResolveConflictRequest, ResolveConflictResponse, StepData, SyncOperation,
    SyncRequest, SyncResponse, SyncStatus, STALENESS_WINDOW_MS,
};
use tracing::{debug, warn};

/// The client's durable local view: last-known step sample, resource view,
/// and the timestamp of the last successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    /// The player this device belongs to.
    pub player_id: String,
    /// Last-known step sample.
    pub step_data: StepData,
    /// Local resource view, if tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PlayerResources>,
    /// Last successful sync (Unix milliseconds).
    #[serde(rename = "lastSync")]
    pub last_sync_ms: u64,
}

impl ClientState {
    /// Creates state for a device that has never synced.
    pub fn new(player_id: impl Into<String>, last_sync_ms: u64) -> Self {
        Self {
            player_id: player_id.into(),
            step_data: StepData::zero(),
            resources: None,
            last_sync_ms,
        }
    }
}

/// The client-resident sync service.
///
/// Owns the durable operation queue and local state, and drives the
/// transport. One sync runs at a time per client; offline-accumulated
/// operations are never silently lost: anything the server did not
/// confirm goes back into the queue, except operations past the 7-day
/// staleness window, which are intentionally dropped with a warning.
pub struct SyncClient<T: SyncTransport, Q: QueueBackend, S: StateBackend> {
    transport: T,
    queue: OperationQueue<Q>,
    state_backend: S,
    state: Mutex<ClientState>,
    in_progress: AtomicBool,
}

impl<T: SyncTransport, Q: QueueBackend, S: StateBackend> SyncClient<T, Q, S> {
    /// Opens the client, reloading persisted state if present. A device
    /// that has never synced starts its window at `now_ms`.
    pub fn open(
        transport: T,
        queue: OperationQueue<Q>,
        state_backend: S,
        player_id: &str,
        now_ms: u64,
    ) -> ClientResult<Self> {
        let state = state_backend
            .load()?
            .unwrap_or_else(|| ClientState::new(player_id, now_ms));

        Ok(Self {
            transport,
            queue,
            state_backend,
            state: Mutex::new(state),
            in_progress: AtomicBool::new(false),
        })
    }

    /// Records a new local step sample.
    pub fn record_steps(&self, step_data: StepData) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.step_data = step_data;
        self.state_backend.persist(&state)
    }

    /// Records the local resource view.
    pub fn record_resources(&self, resources: PlayerResources) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.resources = Some(resources);
        self.state_backend.persist(&state)
    }

    /// Queues an operation for the next sync.
    pub fn enqueue(&self, operation: SyncOperation) -> ClientResult<()> {
        if let Some(evicted) = self.queue.enqueue(operation)? {
            warn!(operation = %evicted.id, "queue full, evicted oldest operation");
        }
        Ok(())
    }

    /// Number of operations awaiting sync.
    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    /// Timestamp of the last successful sync.
    pub fn last_sync_ms(&self) -> u64 {
        self.state.lock().last_sync_ms
    }

    /// A copy of the current local state.
    pub fn state(&self) -> ClientState {
        self.state.lock().clone()
    }

    /// Runs one sync against the server.
    ///
    /// Returns the server's response verbatim. On a transport error the
    /// whole batch is back in the queue and the call is safe to retry; on
    /// a non-success response (blocked or rejected) likewise. On success,
    /// only individually failed operations are re-queued.
    pub fn sync(&self, now_ms: u64) -> ClientResult<SyncResponse> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::SyncInProgress);
        }
        let result = self.run_sync(now_ms);
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    fn run_sync(&self, now_ms: u64) -> ClientResult<SyncResponse> {
        let drained = self.queue.drain()?;
        let cutoff = now_ms.saturating_sub(STALENESS_WINDOW_MS);
        let (batch, stale): (Vec<SyncOperation>, Vec<SyncOperation>) = drained
            .into_iter()
            .partition(|op| op.timestamp_ms >= cutoff);
        if !stale.is_empty() {
            warn!(
                count = stale.len(),
                "discarding operations past the staleness window"
            );
        }

        let request = {
            let state = self.state.lock();
            SyncRequest {
                player_id: state.player_id.clone(),
                step_data: state.step_data.clone(),
                operations: batch.clone(),
                last_sync_ms: state.last_sync_ms,
                resources: state.resources,
            }
        };

        debug!(
            player = %request.player_id,
            operations = request.operations.len(),
            "submitting sync"
        );
        let response = match self.transport.sync(&request) {
            Ok(response) => response,
            Err(error) => {
                self.queue.requeue_front(batch)?;
                return Err(error);
            }
        };

        if !response.success {
            // Blocked or rejected: nothing was confirmed.
            self.queue.requeue_front(batch)?;
            return Ok(response);
        }

        let failed_ids: HashSet<&str> = response
            .failed_operations
            .iter()
            .map(|f| f.operation_id.as_str())
            .collect();
        if !failed_ids.is_empty() {
            let requeue: Vec<SyncOperation> = batch
                .iter()
                .filter(|op| failed_ids.contains(op.id.as_str()))
                .cloned()
                .collect();
            warn!(count = requeue.len(), "re-queueing failed operations");
            self.queue.requeue_front(requeue)?;
        }

        {
            let mut state = self.state.lock();
            state.last_sync_ms = response.last_sync_ms;
            self.state_backend.persist(&state)?;
        }

        Ok(response)
    }

    /// Submits a manual conflict resolution.
    pub fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> ClientResult<ResolveConflictResponse> {
        self.transport.resolve_conflict(request)
    }

    /// Fetches this player's server-side sync status. Used to reconcile
    /// after a timeout, where the server may have committed without the
    /// client observing the response.
    pub fn server_status(&self) -> ClientResult<SyncStatus> {
        let player_id = self.state.lock().player_id.clone();
        self.transport.status(&player_id)
    }
}
