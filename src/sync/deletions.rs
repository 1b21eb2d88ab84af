//! Deletion tracking
//!
//! Turns deletion requests into tombstones and removes the live records they name.
//! Deletions are never conflict-checked: a tombstone is terminal.

use std::collections::HashSet;

use crate::error::Result;
use crate::store::UnitOfWork;

use super::types::{EntityKind, Tombstone};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionTracker;

impl DeletionTracker {
    pub fn new() -> Self {
        Self
    }

    /// Tombstones in `incoming` whose `sync_id` is neither already stored nor repeated
    /// earlier in the batch
    pub fn novel(&self, incoming: &[Tombstone], existing: &[Tombstone]) -> Vec<Tombstone> {
        let mut seen: HashSet<&str> = existing.iter().map(|t| t.sync_id.as_str()).collect();

        incoming
            .iter()
            .filter(|tombstone| seen.insert(tombstone.sync_id.as_str()))
            .cloned()
            .collect()
    }

    /// Record tombstones and delete the referenced items and tags
    ///
    /// Returns every submitted `sync_id`. Live records are deleted for all of them,
    /// including ids that were already tombstoned, so an earlier partial failure cannot
    /// leave a record behind.
    pub async fn apply_deletions(
        &self,
        uow: &mut dyn UnitOfWork,
        incoming: &[Tombstone],
    ) -> Result<HashSet<String>> {
        if incoming.is_empty() {
            return Ok(HashSet::new());
        }

        let sync_ids: Vec<String> = incoming
            .iter()
            .map(|tombstone| tombstone.sync_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let existing = uow.find_tombstones(&sync_ids).await?;
        let novel = self.novel(incoming, &existing);
        if !novel.is_empty() {
            uow.insert_tombstones(&novel).await?;
        }

        let (items, tags): (Vec<&Tombstone>, Vec<&Tombstone>) = incoming
            .iter()
            .partition(|tombstone| tombstone.entity_type == EntityKind::Item);
        let item_ids: Vec<String> = items.into_iter().map(|t| t.sync_id.clone()).collect();
        let tag_ids: Vec<String> = tags.into_iter().map(|t| t.sync_id.clone()).collect();

        let mut removed = 0;
        if !item_ids.is_empty() {
            removed += uow.delete_records(EntityKind::Item, &item_ids).await?;
        }
        if !tag_ids.is_empty() {
            removed += uow.delete_records(EntityKind::Tag, &tag_ids).await?;
        }

        tracing::debug!(
            "Applied {} deletions: {} new tombstones, {} live records removed",
            incoming.len(),
            novel.len(),
            removed
        );

        Ok(sync_ids.into_iter().collect())
    }
}
