//! Sync module for incremental client synchronization
//!
//! Provides:
//! - Last-write-wins reconciliation of items and tags
//! - Tombstone tracking for deletions
//! - Delta computation against a client cursor
//!
//! # Sync Protocol
//!
//! 1. Client sends a `SyncRequest` with its cursor (`last_sync_ts`) and local changes
//! 2. Server reconciles tags and items, rejecting the request on any stale write
//! 3. Server records deletions as tombstones and removes the live records
//! 4. Server issues a new cursor (`sync_ts`) from its own clock
//! 5. Server returns every record and tombstone newer than the old cursor that the
//!    client did not push itself
//!
//! # Conflict Resolution
//!
//! - Whole-record last-write-wins on the client-assigned `changed_ts`
//! - Ties go to the incoming write
//! - An older write fails the whole request; nothing from it is kept
//! - Deletions always win

mod deletions;
mod delta;
mod reconcile;
mod service;
mod types;

pub use deletions::DeletionTracker;
pub use delta::DeltaComputer;
pub use reconcile::{ReconcilePlan, Reconciler};
pub use service::{Clock, SyncService, SystemClock};
pub use types::{
    ChangeSet, EntityKind, RawChanges, RawSnapshot, Record, Snapshot, SyncRequest,
    SyncResponse, Tombstone,
};
