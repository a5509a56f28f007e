//! The sync server facade.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use std::sync::Arc;
use stepsync_engine::{PlayerStore, SyncOrchestrator};
use stepsync_protocol::{
    DataConflict, ResolveConflictRequest, ResolveConflictResponse, RollbackResponse, SyncRequest,
    SyncResponse, SyncStatus, unix_time_ms,
};
use tracing::warn;

/// The sync server.
///
/// Routes the five sync endpoints by path and speaks JSON bodies, so it can
/// sit behind any HTTP framework, or serve as the loopback server in
/// tests. Handler errors on the sync-shaped endpoints are folded into the
/// endpoint's own response body (the `success=false` shape); a real HTTP
/// binding can instead use the typed handler methods together with
/// [`ServerError::status_code`] and [`ServerError::error_body`].
pub struct SyncServer<S: PlayerStore> {
    handler: RequestHandler<S>,
}

impl<S: PlayerStore> SyncServer<S> {
    /// Creates a new sync server over the given engine.
    pub fn new(config: ServerConfig, orchestrator: Arc<SyncOrchestrator<S>>) -> Self {
        let context = Arc::new(HandlerContext::new(config, orchestrator));
        let handler = RequestHandler::new(context);
        Self { handler }
    }

    /// Handles `POST /sync/player-data`.
    pub fn sync(&self, request: SyncRequest) -> ServerResult<SyncResponse> {
        self.handler.handle_sync(request)
    }

    /// Handles `POST /sync/resolve-conflict`.
    pub fn resolve_conflict(
        &self,
        request: ResolveConflictRequest,
    ) -> ServerResult<ResolveConflictResponse> {
        self.handler.handle_resolve_conflict(request)
    }

    /// Handles `GET /sync/status/:playerId`.
    pub fn status(&self, player_id: &str) -> ServerResult<SyncStatus> {
        self.handler.handle_status(player_id)
    }

    /// Handles `POST /sync/rollback/:transactionId`.
    pub fn rollback(&self, transaction_id: &str) -> ServerResult<RollbackResponse> {
        self.handler.handle_rollback(transaction_id)
    }

    /// Handles `GET /sync/conflicts/:playerId`.
    pub fn conflicts(
        &self,
        player_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> ServerResult<Vec<DataConflict>> {
        self.handler.handle_conflicts(player_id, limit, offset)
    }

    /// Routes a POST request by path, returning the JSON response body.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        match path {
            "/sync/player-data" => {
                let response = match decode::<SyncRequest>(body) {
                    Ok(request) => {
                        let last_sync_ms = request.last_sync_ms;
                        match self.sync(request) {
                            Ok(response) => response,
                            Err(error) => fold_sync_error(error, last_sync_ms),
                        }
                    }
                    Err(error) => fold_sync_error(error, 0),
                };
                encode(&response)
            }
            "/sync/resolve-conflict" => {
                let response = match decode::<ResolveConflictRequest>(body) {
                    Ok(request) => match self.resolve_conflict(request) {
                        Ok(response) => response,
                        Err(error) => ResolveConflictResponse::error(error.to_string()),
                    },
                    Err(error) => ResolveConflictResponse::error(error.to_string()),
                };
                encode(&response)
            }
            _ => {
                if let Some(transaction_id) = path.strip_prefix("/sync/rollback/") {
                    let response = match self.rollback(transaction_id) {
                        Ok(response) => response,
                        Err(error) => RollbackResponse::error(error.to_string()),
                    };
                    return encode(&response);
                }
                warn!(path, "no POST route");
                Err(format!("404 no route for POST {path}"))
            }
        }
    }

    /// Routes a GET request by path, returning the JSON response body.
    pub fn handle_get(&self, path: &str) -> Result<Vec<u8>, String> {
        if let Some(player_id) = path.strip_prefix("/sync/status/") {
            let status = self
                .status(player_id)
                .map_err(|e| format!("{} {}", e.status_code(), e))?;
            return encode(&status);
        }

        if let Some(rest) = path.strip_prefix("/sync/conflicts/") {
            let (player_id, query) = match rest.split_once('?') {
                Some((player_id, query)) => (player_id, Some(query)),
                None => (rest, None),
            };
            let limit = query_param(query, "limit");
            let offset = query_param(query, "offset");
            let conflicts = self
                .conflicts(player_id, limit, offset)
                .map_err(|e| format!("{} {}", e.status_code(), e))?;
            return encode(&conflicts);
        }

        warn!(path, "no GET route");
        Err(format!("404 no route for GET {path}"))
    }
}

/// Folds a handler error into the sync endpoint's own response shape, with
/// one `CODE: message` entry per validation error.
fn fold_sync_error(error: ServerError, last_sync_ms: u64) -> SyncResponse {
    let now_ms = unix_time_ms();
    match error {
        ServerError::Validation(report) => {
            let mut response = SyncResponse::failure("", last_sync_ms, now_ms);
            response.errors = report
                .errors
                .iter()
                .map(|e| format!("{}: {e}", e.code()))
                .collect();
            response
        }
        other => {
            let body = other.error_body();
            SyncResponse::failure(format!("{}: {}", body.code, body.message), last_sync_ms, now_ms)
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    serde_json::from_slice(body)
        .map_err(|e| ServerError::InvalidRequest(format!("malformed body: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, String> {
    serde_json::to_vec(value).map_err(|e| format!("500 failed to encode response: {e}"))
}

fn query_param(query: Option<&str>, name: &str) -> Option<usize> {
    let query = query?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == name {
            value.parse().ok()
        } else {
            None
        }
    })
}
