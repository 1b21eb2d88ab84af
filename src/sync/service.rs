//! Sync orchestration
//!
//! Runs one sync request end to end inside a single store unit of work:
//! tags, items, deletions, cursor, deltas. Any error drops the unit of work, so a
//! request either commits every write or none of them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::store::Store;

use super::deletions::DeletionTracker;
use super::delta::DeltaComputer;
use super::reconcile::Reconciler;
use super::types::{EntityKind, RawSnapshot, Snapshot, SyncRequest, SyncResponse};

/// Source of sync cursors
pub trait Clock: Send + Sync {
    /// Current server time in epoch seconds
    fn now(&self) -> i64;
}

/// Wall clock that never hands out a smaller value than it already has
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        let now = Utc::now().timestamp();
        let previous = self.last.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

/// Entry point of the sync engine
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Server time in milliseconds, for client clock-skew estimation
    pub fn server_time_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Open and commit an empty unit of work
    pub async fn check_store(&self) -> Result<()> {
        self.store.begin().await?.commit().await?;
        Ok(())
    }

    /// Apply a client's change set and return what it has not seen yet
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        let since = request.since();
        let time_delta_ms = request.time_delta_ms;
        let changes = request.changes.validate()?;

        tracing::debug!(
            "Sync since {:?}: {} items, {} tags, {} deletions",
            since,
            changes.items.len(),
            changes.tags.len(),
            changes.deletions.len()
        );

        let mut uow = self.store.begin().await?;

        let tag_ids = Reconciler::new(EntityKind::Tag)
            .reconcile(uow.as_mut(), &changes.tags)
            .await?;
        let item_ids = Reconciler::new(EntityKind::Item)
            .reconcile(uow.as_mut(), &changes.items)
            .await?;
        let deleted_ids = DeletionTracker::new()
            .apply_deletions(uow.as_mut(), &changes.deletions)
            .await?;

        // Taken after every write and before any delta read
        let sync_ts = self.clock.now();

        let delta = DeltaComputer::new(since);
        let items = delta.records(uow.as_mut(), EntityKind::Item, &item_ids).await?;
        let tags = delta.records(uow.as_mut(), EntityKind::Tag, &tag_ids).await?;
        let deletions_to_add = delta.tombstones(uow.as_mut(), &deleted_ids).await?;

        uow.commit().await?;

        tracing::info!(
            "Sync committed at {}: returning {} items, {} tags, {} deletions",
            sync_ts,
            items.len(),
            tags.len(),
            deletions_to_add.len()
        );

        Ok(SyncResponse {
            success: true,
            sync_ts,
            time_delta_ms,
            items,
            tags,
            deletions_to_add,
        })
    }

    /// Replace every collection with the supplied sets, without conflict checks
    pub async fn replace_all(&self, snapshot: RawSnapshot) -> Result<()> {
        let snapshot = snapshot.validate()?;
        let mut uow = self.store.begin().await?;

        uow.delete_all_records(EntityKind::Item).await?;
        uow.delete_all_records(EntityKind::Tag).await?;
        uow.delete_all_tombstones().await?;

        if !snapshot.items.is_empty() {
            uow.insert_records(EntityKind::Item, &snapshot.items).await?;
        }
        if !snapshot.tags.is_empty() {
            uow.insert_records(EntityKind::Tag, &snapshot.tags).await?;
        }
        if !snapshot.deletions.is_empty() {
            uow.insert_tombstones(&snapshot.deletions).await?;
        }

        uow.commit().await?;

        tracing::info!(
            "Replaced all collections: {} items, {} tags, {} deletions",
            snapshot.items.len(),
            snapshot.tags.len(),
            snapshot.deletions.len()
        );
        Ok(())
    }

    /// Delete every item, tag and tombstone
    pub async fn wipe(&self) -> Result<()> {
        let mut uow = self.store.begin().await?;

        let items = uow.delete_all_records(EntityKind::Item).await?;
        let tags = uow.delete_all_records(EntityKind::Tag).await?;
        let deletions = uow.delete_all_tombstones().await?;

        uow.commit().await?;

        tracing::info!(
            "Wiped store: {} items, {} tags, {} deletions removed",
            items,
            tags,
            deletions
        );
        Ok(())
    }

    /// Full contents of every collection
    pub async fn export(&self) -> Result<Snapshot> {
        let mut uow = self.store.begin().await?;
        let nothing = HashSet::new();

        let items = uow
            .records_changed_since(EntityKind::Item, None, &nothing)
            .await?;
        let tags = uow
            .records_changed_since(EntityKind::Tag, None, &nothing)
            .await?;
        let deletions = uow.tombstones_since(None, &nothing).await?;
        uow.commit().await?;

        Ok(Snapshot {
            items,
            tags,
            deletions,
        })
    }
}
