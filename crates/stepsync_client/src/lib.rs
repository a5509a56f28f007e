//! # StepSync Client
//!
//! Client-side sync runtime for StepSync.
//!
//! This crate provides:
//! - A durable, bounded FIFO of pending operations
//! - Durable local player state (step sample + last sync)
//! - A transport abstraction over the sync endpoints
//! - HTTP transport over a pluggable `HttpClient`
//! - The client sync service (request assembly, staleness discard,
//!   re-queue of unconfirmed operations)
//!
//! ## Key Invariants
//!
//! - The queue never exceeds 1000 entries; the oldest are evicted first
//! - Every queue mutation rewrites the persisted representation in full
//!   (last write wins at whole-queue granularity)
//! - Offline operations are never silently lost: anything not confirmed
//!   by the server returns to the queue, except operations past the
//!   7-day staleness window, which are dropped with a warning

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod http;
mod queue;
mod state;
mod transport;

pub use client::{ClientState, SyncClient};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use queue::{FileBackend, MemoryBackend, OperationQueue, QueueBackend, MAX_QUEUE_LEN};
pub use state::{FileStateBackend, MemoryStateBackend, StateBackend};
pub use transport::{MockTransport, SyncTransport};
