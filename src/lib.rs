//! Delta Sync Server Library
//!
//! Server side of an incremental push/pull protocol for offline-first clients. A
//! client pushes the items, tags and deletions it changed locally together with the
//! cursor of its last sync, and receives every change it has not seen yet plus a new
//! cursor.
//!
//! # Modules
//!
//! - `sync`: reconciliation, tombstones, delta computation and orchestration
//! - `store`: record store trait with SQLite and in-memory backends
//! - `routes`: axum HTTP surface
//! - `config`, `error`, `state`: ambient plumbing

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Result, StoreError, SyncError};
pub use routes::app;
pub use state::AppState;
