//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different libraries
//! (reqwest, hyper, ureq, a platform webview bridge) can supply the wire
//! layer. Request and response bodies are JSON.

use crate::error::{ClientError, ClientResult};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use stepsync_protocol::{
    ResolveConflictRequest, ResolveConflictResponse, SyncRequest, SyncResponse, SyncStatus,
};

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Sends a GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport with JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g. `https://sync.example.com`).
    base_url: String,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns true while the transport considers itself connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Marks the transport connected again after a failure.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record_failure(&self, message: &str) {
        *self.last_error.write() = Some(message.to_string());
        self.connected.store(false, Ordering::SeqCst);
    }

    fn decode<Res: DeserializeOwned>(&self, body: &[u8]) -> ClientResult<Res> {
        *self.last_error.write() = None;
        serde_json::from_slice(body)
            .map_err(|e| ClientError::Protocol(format!("failed to decode response: {e}")))
    }

    fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> ClientResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| ClientError::Protocol(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let response_body = self.client.post(&url, body).map_err(|e| {
            self.record_failure(&e);
            ClientError::network(e)
        })?;

        self.decode(&response_body)
    }

    fn get_json<Res: DeserializeOwned>(&self, endpoint: &str) -> ClientResult<Res> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response_body = self.client.get(&url).map_err(|e| {
            self.record_failure(&e);
            ClientError::network(e)
        })?;

        self.decode(&response_body)
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn sync(&self, request: &SyncRequest) -> ClientResult<SyncResponse> {
        self.post_json("/sync/player-data", request)
    }

    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> ClientResult<ResolveConflictResponse> {
        self.post_json("/sync/resolve-conflict", request)
    }

    fn status(&self, player_id: &str) -> ClientResult<SyncStatus> {
        self.get_json(&format!("/sync/status/{player_id}"))
    }
}

/// Servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;

    /// Handles a GET request and returns the response body.
    fn handle_get(&self, path: &str) -> Result<Vec<u8>, String>;
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client over the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_get(path)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use stepsync_protocol::{PlayerResources, StepData};

    #[derive(Default)]
    struct TestClient {
        response: Mutex<Option<Vec<u8>>>,
        fail_with: Mutex<Option<String>>,
    }

    impl TestClient {
        fn set_response(&self, body: Vec<u8>) {
            *self.response.lock() = Some(body);
        }

        fn fail_with(&self, message: &str) {
            *self.fail_with.lock() = Some(message.to_string());
        }

        fn answer(&self) -> Result<Vec<u8>, String> {
            if let Some(message) = self.fail_with.lock().clone() {
                return Err(message);
            }
            self.response
                .lock()
                .clone()
                .ok_or_else(|| "no response set".to_string())
        }
    }

    impl HttpClient for TestClient {
        fn post(&self, _url: &str, _body: Vec<u8>) -> Result<Vec<u8>, String> {
            self.answer()
        }

        fn get(&self, _url: &str) -> Result<Vec<u8>, String> {
            self.answer()
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

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
    fn transport_decodes_sync_response() {
        let client = TestClient::default();
        let response = SyncResponse::committed(1, vec![], PlayerResources::new(1, 10), 5, 6);
        client.set_response(serde_json::to_vec(&response).unwrap());

        let transport = HttpTransport::new("https://sync.example.com", client);
        let decoded = transport.sync(&request()).unwrap();
        assert_eq!(decoded, response);
        assert!(transport.is_connected());
        assert!(transport.last_error().is_none());
    }

    #[test]
    fn transport_failure_is_a_network_error() {
        let client = TestClient::default();
        client.fail_with("connection refused");

        let transport = HttpTransport::new("https://sync.example.com", client);
        let result = transport.sync(&request());

        assert!(matches!(result, Err(ClientError::Network { .. })));
        assert!(!transport.is_connected());
        assert_eq!(transport.last_error().unwrap(), "connection refused");
    }

    #[test]
    fn transport_reconnects() {
        let client = TestClient::default();
        client.fail_with("connection refused");

        let transport = HttpTransport::new("https://sync.example.com", client);
        let _ = transport.sync(&request());
        assert!(!transport.is_connected());

        transport.reconnect();
        assert!(transport.is_connected());
    }

    #[test]
    fn garbage_body_is_a_protocol_error() {
        let client = TestClient::default();
        client.set_response(b"not json".to_vec());

        let transport = HttpTransport::new("https://sync.example.com", client);
        let result = transport.sync(&request());
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }

    #[test]
    fn loopback_strips_base_url() {
        struct EchoServer;
        impl LoopbackServer for EchoServer {
            fn handle_post(&self, path: &str, _body: &[u8]) -> Result<Vec<u8>, String> {
                Ok(path.as_bytes().to_vec())
            }

            fn handle_get(&self, path: &str) -> Result<Vec<u8>, String> {
                Ok(path.as_bytes().to_vec())
            }
        }

        let client = LoopbackClient::new(EchoServer);
        let body = client
            .post("https://sync.example.com/sync/player-data", vec![])
            .unwrap();
        assert_eq!(body, b"/sync/player-data");

        let body = client
            .get("https://sync.example.com/sync/status/player-1")
            .unwrap();
        assert_eq!(body, b"/sync/status/player-1");
    }
}
