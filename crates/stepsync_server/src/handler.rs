//! Request handlers for the sync endpoints.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use std::sync::Arc;
use stepsync_engine::{PlayerStore, SyncOrchestrator};
use stepsync_protocol::{
    DataConflict, ResolveConflictRequest, ResolveConflictResponse, RollbackResponse, SyncRequest,
    SyncResponse, SyncStatus,
};
use tracing::debug;

/// Context for request handling.
pub struct HandlerContext<S: PlayerStore> {
    /// Server configuration.
    pub config: ServerConfig,
    /// The reconciliation engine (shared across all handlers).
    pub orchestrator: Arc<SyncOrchestrator<S>>,
}

impl<S: PlayerStore> HandlerContext<S> {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, orchestrator: Arc<SyncOrchestrator<S>>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }
}

/// Handler for sync requests, one method per endpoint.
pub struct RequestHandler<S: PlayerStore> {
    context: Arc<HandlerContext<S>>,
}

impl<S: PlayerStore> RequestHandler<S> {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext<S>>) -> Self {
        Self { context }
    }

    /// Handles `POST /sync/player-data`.
    pub fn handle_sync(&self, request: SyncRequest) -> ServerResult<SyncResponse> {
        debug!(player = %request.player_id, operations = request.operations.len(), "sync request");
        Ok(self.context.orchestrator.sync(request)?)
    }

    /// Handles `POST /sync/resolve-conflict`.
    pub fn handle_resolve_conflict(
        &self,
        request: ResolveConflictRequest,
    ) -> ServerResult<ResolveConflictResponse> {
        debug!(conflict = %request.conflict_id, strategy = ?request.strategy, "resolve request");
        let record = self.context.orchestrator.resolve_conflict(&request)?;
        Ok(ResolveConflictResponse::applied(record))
    }

    /// Handles `GET /sync/status/:playerId`.
    pub fn handle_status(&self, player_id: &str) -> ServerResult<SyncStatus> {
        Ok(self.context.orchestrator.status(player_id)?)
    }

    /// Handles `POST /sync/rollback/:transactionId`.
    pub fn handle_rollback(&self, transaction_id: &str) -> ServerResult<RollbackResponse> {
        debug!(transaction = %transaction_id, "rollback request");
        self.context.orchestrator.rollback_transaction(transaction_id)?;
        Ok(RollbackResponse::applied())
    }

    /// Handles `GET /sync/conflicts/:playerId?limit=&offset=`.
    pub fn handle_conflicts(
        &self,
        player_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> ServerResult<Vec<DataConflict>> {
        let limit = limit
            .unwrap_or(self.context.config.default_page_size)
            .min(self.context.config.max_page_size);
        let offset = offset.unwrap_or(0);
        Ok(self.context.orchestrator.conflicts(player_id, limit, offset))
    }
}
