//! Transport layer abstraction for the sync endpoints.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use stepsync_protocol::{
    ResolveConflictRequest, ResolveConflictResponse, SyncRequest, SyncResponse, SyncStatus,
};

/// Network communication with the sync server.
///
/// This trait abstracts the network layer so different implementations can
/// be plugged in (HTTP, loopback for tests, mock).
pub trait SyncTransport: Send + Sync {
    /// Submits a sync request.
    fn sync(&self, request: &SyncRequest) -> ClientResult<SyncResponse>;

    /// Submits a manual conflict resolution.
    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> ClientResult<ResolveConflictResponse>;

    /// Fetches a player's sync status.
    fn status(&self, player_id: &str) -> ClientResult<SyncStatus>;
}

/// A mock transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    online: AtomicBool,
    sync_response: Mutex<Option<SyncResponse>>,
    resolve_response: Mutex<Option<ResolveConflictResponse>>,
    status_response: Mutex<Option<SyncStatus>>,
    sync_requests: Mutex<Vec<SyncRequest>>,
}

impl MockTransport {
    /// Creates an online mock with no responses set.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            sync_response: Mutex::new(None),
            resolve_response: Mutex::new(None),
            status_response: Mutex::new(None),
            sync_requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the response returned by `sync`.
    pub fn set_sync_response(&self, response: SyncResponse) {
        *self.sync_response.lock() = Some(response);
    }

    /// Sets the response returned by `resolve_conflict`.
    pub fn set_resolve_response(&self, response: ResolveConflictResponse) {
        *self.resolve_response.lock() = Some(response);
    }

    /// Sets the response returned by `status`.
    pub fn set_status_response(&self, response: SyncStatus) {
        *self.status_response.lock() = Some(response);
    }

    /// Simulates connectivity loss or regain.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// The sync requests received so far.
    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        self.sync_requests.lock().clone()
    }

    fn check_online(&self) -> ClientResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::network("offline"))
        }
    }
}

impl SyncTransport for MockTransport {
    fn sync(&self, request: &SyncRequest) -> ClientResult<SyncResponse> {
        self.check_online()?;
        self.sync_requests.lock().push(request.clone());
        self.sync_response
            .lock()
            .clone()
            .ok_or_else(|| ClientError::Protocol("no mock sync response set".into()))
    }

    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> ClientResult<ResolveConflictResponse> {
        let _ = request;
        self.check_online()?;
        self.resolve_response
            .lock()
            .clone()
            .ok_or_else(|| ClientError::Protocol("no mock resolve response set".into()))
    }

    fn status(&self, player_id: &str) -> ClientResult<SyncStatus> {
        let _ = player_id;
        self.check_online()?;
        self.status_response
            .lock()
            .clone()
            .ok_or_else(|| ClientError::Protocol("no mock status response set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepsync_protocol::{PlayerResources, StepData};

    fn request() -> SyncRequest {
        SyncRequest {
            player_id: "player-1".into(),
            step_data: StepData::new(10, 10, 0),
            operations: Vec::new(),
            last_sync_ms: 0,
            resources: None,
        }
    }

    #[test]
    fn offline_mock_fails_with_network_error() {
        let transport = MockTransport::new();
        transport.set_online(false);

        let result = transport.sync(&request());
        assert!(matches!(result, Err(ClientError::Network { .. })));
    }

    #[test]
    fn mock_returns_configured_response() {
        let transport = MockTransport::new();
        transport.set_sync_response(SyncResponse::committed(
            1,
            vec![],
            PlayerResources::new(1, 10),
            100,
            101,
        ));

        let response = transport.sync(&request()).unwrap();
        assert!(response.success);
        assert_eq!(transport.sync_requests().len(), 1);
    }

    #[test]
    fn mock_without_response_is_a_protocol_error() {
        let transport = MockTransport::new();
        let result = transport.status("player-1");
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }
}
