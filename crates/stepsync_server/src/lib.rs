//! # StepSync Server
//!
//! Sync endpoint handlers for StepSync.
//!
//! This crate provides:
//! - One handler per sync endpoint (player-data, resolve-conflict, status,
//!   rollback, conflicts)
//! - A path-routing facade with JSON bodies, usable behind any HTTP
//!   framework or as a loopback server in tests
//! - Error-to-status mapping for the validation taxonomy
//!
//! # Architecture
//!
//! The server is a thin shell over `stepsync_engine`: handlers decode the
//! wire shape, delegate to the orchestrator, and map engine errors onto
//! HTTP-style responses. Authentication/session issuance stays outside;
//! handlers receive an opaque, already-authenticated player id.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
