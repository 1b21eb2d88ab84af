//! Delta computation
//!
//! Everything the store holds that a client with a given cursor has not seen yet.

use std::collections::HashSet;

use crate::error::Result;
use crate::store::UnitOfWork;

use super::types::{EntityKind, Record, Tombstone};

/// Computes deltas relative to one client cursor
#[derive(Debug, Clone, Copy)]
pub struct DeltaComputer {
    since: Option<i64>,
}

impl DeltaComputer {
    /// `since` of `None` means the client has never synchronized
    pub fn new(since: Option<i64>) -> Self {
        Self { since }
    }

    /// Records of `kind` changed after the cursor, minus `exclude`
    pub async fn records(
        &self,
        uow: &mut dyn UnitOfWork,
        kind: EntityKind,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Record>> {
        let records = uow.records_changed_since(kind, self.since, exclude).await?;
        tracing::debug!("{} {} delta records since {:?}", records.len(), kind, self.since);
        Ok(records)
    }

    /// Tombstones written after the cursor, minus the `sync_id`s in `exclude`
    pub async fn tombstones(
        &self,
        uow: &mut dyn UnitOfWork,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Tombstone>> {
        let tombstones = uow.tombstones_since(self.since, exclude).await?;
        tracing::debug!("{} delta tombstones since {:?}", tombstones.len(), self.since);
        Ok(tombstones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::backends;

    fn sorted_ids(records: Vec<Record>) -> Vec<String> {
        let mut ids: Vec<String> = records.into_iter().map(|r| r.id).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_first_sync_returns_everything_not_excluded() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            let items: Vec<Record> = (1..=5).map(|i| Record::new(format!("i{i}"), i)).collect();
            uow.insert_records(EntityKind::Item, &items).await.unwrap();

            let delta = DeltaComputer::new(None);
            let all = delta
                .records(uow.as_mut(), EntityKind::Item, &HashSet::new())
                .await
                .unwrap();
            assert_eq!(all.len(), 5, "{name}");

            let exclude = HashSet::from(["i2".to_string()]);
            let rest = delta
                .records(uow.as_mut(), EntityKind::Item, &exclude)
                .await
                .unwrap();
            assert_eq!(sorted_ids(rest), vec!["i1", "i3", "i4", "i5"], "{name}");
        }
    }

    #[tokio::test]
    async fn test_cursor_is_exclusive() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            uow.insert_records(
                EntityKind::Tag,
                &[Record::new("old", 100), Record::new("new", 101)],
            )
            .await
            .unwrap();
            uow.insert_tombstones(&[
                Tombstone::new("gone", EntityKind::Item, 100),
                Tombstone::new("just-gone", EntityKind::Item, 150),
                Tombstone::new("mine", EntityKind::Tag, 160),
            ])
            .await
            .unwrap();

            let delta = DeltaComputer::new(Some(100));
            let tags = delta
                .records(uow.as_mut(), EntityKind::Tag, &HashSet::new())
                .await
                .unwrap();
            assert_eq!(sorted_ids(tags), vec!["new"], "{name}");

            let exclude = HashSet::from(["mine".to_string()]);
            let tombstones = delta.tombstones(uow.as_mut(), &exclude).await.unwrap();
            assert_eq!(
                tombstones,
                vec![Tombstone::new("just-gone", EntityKind::Item, 150)],
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_delta_is_not_an_error() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            let delta = DeltaComputer::new(Some(5));
            assert!(delta
                .records(uow.as_mut(), EntityKind::Item, &HashSet::new())
                .await
                .unwrap()
                .is_empty(), "{name}");
            assert!(delta
                .tombstones(uow.as_mut(), &HashSet::new())
                .await
                .unwrap()
                .is_empty(), "{name}");
        }
    }
}
