//! Record store
//!
//! Keyed persistence for the three sync collections: items, tags and deletions
//! (tombstones). All reads and writes go through a [`UnitOfWork`]; nothing it writes is
//! visible to other units until [`UnitOfWork::commit`], and dropping it uncommitted
//! discards its writes.
//!
//! Backends:
//! - [`SqliteStore`]: `sqlx` SQLite pool, one immediate transaction per unit of work
//! - [`MemoryStore`]: process-local maps, for tests and throwaway deployments

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use schema::initialize_schema;
pub use sqlite::{create_pool, SqliteStore};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::sync::{EntityKind, Record, Tombstone};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Process-scoped store handle, created once at startup
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn UnitOfWork + 'a>>;
}

/// Operations on the sync collections inside one unit of work
#[async_trait]
pub trait UnitOfWork: Send {
    /// Fetch the records stored under exactly these ids
    async fn find_records(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<Vec<Record>>;

    /// Insert a batch of records; an id already present is overwritten
    async fn insert_records(&mut self, kind: EntityKind, records: &[Record]) -> StoreResult<()>;

    /// Replace the record with the same id, if there is one
    async fn replace_record(&mut self, kind: EntityKind, record: &Record) -> StoreResult<()>;

    async fn delete_records(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<u64>;

    async fn delete_all_records(&mut self, kind: EntityKind) -> StoreResult<u64>;

    /// Records with `changed_ts > since` (all records when `since` is `None`) whose id is
    /// not in `exclude`
    async fn records_changed_since(
        &mut self,
        kind: EntityKind,
        since: Option<i64>,
        exclude: &HashSet<String>,
    ) -> StoreResult<Vec<Record>>;

    async fn find_tombstones(&mut self, sync_ids: &[String]) -> StoreResult<Vec<Tombstone>>;

    /// Insert a batch of tombstones; an existing `sync_id` is left untouched
    async fn insert_tombstones(&mut self, tombstones: &[Tombstone]) -> StoreResult<()>;

    async fn delete_all_tombstones(&mut self) -> StoreResult<u64>;

    /// Tombstones with `ts > since` (all when `None`) whose `sync_id` is not in `exclude`
    async fn tombstones_since(
        &mut self,
        since: Option<i64>,
        exclude: &HashSet<String>,
    ) -> StoreResult<Vec<Tombstone>>;

    /// Make every write of this unit visible
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Open the store selected by the database configuration
///
/// `memory` selects the in-memory backend, anything else is treated as a SQLite URL.
pub async fn create_store(config: &DatabaseConfig) -> StoreResult<Arc<dyn Store>> {
    if config.url == "memory" {
        tracing::warn!("Using in-memory record store; data is lost on shutdown");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = create_pool(&config.url, config.max_connections).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}


#[cfg(test)]
mod tests {
    use super::testing::backends;
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_find_replace() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            uow.insert_records(
                EntityKind::Item,
                &[
                    Record::new("A", 100).with_field("title", "milk"),
                    Record::new("B", 110),
                ],
            )
            .await
            .unwrap();

            let found = uow
                .find_records(EntityKind::Item, &ids(&["A", "Z"]))
                .await
                .unwrap();
            assert_eq!(found.len(), 1, "{name}");
            assert_eq!(found[0].payload["title"], "milk", "{name}");

            uow.replace_record(EntityKind::Item, &Record::new("A", 150).with_field("title", "eggs"))
                .await
                .unwrap();
            // Replacing an unknown id is a no-op
            uow.replace_record(EntityKind::Item, &Record::new("Q", 1))
                .await
                .unwrap();

            let found = uow
                .find_records(EntityKind::Item, &ids(&["A", "Q"]))
                .await
                .unwrap();
            assert_eq!(found, vec![Record::new("A", 150).with_field("title", "eggs")], "{name}");

            // Collections are disjoint
            assert!(uow
                .find_records(EntityKind::Tag, &ids(&["A"]))
                .await
                .unwrap()
                .is_empty());
            uow.commit().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_changed_since_with_exclusions() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            uow.insert_records(
                EntityKind::Tag,
                &[Record::new("a", 10), Record::new("b", 20), Record::new("c", 30)],
            )
            .await
            .unwrap();

            let exclude: HashSet<String> = ["c".to_string()].into();
            let mut found: Vec<String> = uow
                .records_changed_since(EntityKind::Tag, Some(10), &exclude)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();
            found.sort();
            assert_eq!(found, ids(&["b"]), "{name}");

            let all = uow
                .records_changed_since(EntityKind::Tag, None, &HashSet::new())
                .await
                .unwrap();
            assert_eq!(all.len(), 3, "{name}");
        }
    }

    #[tokio::test]
    async fn test_tombstones_are_write_once() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            uow.insert_tombstones(&[Tombstone::new("B", EntityKind::Item, 5)])
                .await
                .unwrap();
            uow.insert_tombstones(&[Tombstone::new("B", EntityKind::Item, 9)])
                .await
                .unwrap();

            let found = uow.find_tombstones(&ids(&["B"])).await.unwrap();
            assert_eq!(found, vec![Tombstone::new("B", EntityKind::Item, 5)], "{name}");

            let since = uow.tombstones_since(Some(4), &HashSet::new()).await.unwrap();
            assert_eq!(since.len(), 1, "{name}");
            let since = uow.tombstones_since(Some(5), &HashSet::new()).await.unwrap();
            assert!(since.is_empty(), "{name}");

            assert_eq!(uow.delete_all_tombstones().await.unwrap(), 1, "{name}");
            assert_eq!(uow.delete_all_tombstones().await.unwrap(), 0, "{name}");
        }
    }

    #[tokio::test]
    async fn test_dropped_unit_restores_every_collection() {
        for (name, store) in backends().await {
            let mut uow = store.begin().await.unwrap();
            uow.insert_records(EntityKind::Item, &[Record::new("A", 1), Record::new("B", 2)])
                .await
                .unwrap();
            uow.insert_records(EntityKind::Tag, &[Record::new("T", 3)])
                .await
                .unwrap();
            uow.insert_tombstones(&[Tombstone::new("X", EntityKind::Item, 4)])
                .await
                .unwrap();
            uow.commit().await.unwrap();

            {
                let mut uow = store.begin().await.unwrap();
                uow.replace_record(EntityKind::Item, &Record::new("A", 10))
                    .await
                    .unwrap();
                uow.delete_records(EntityKind::Item, &ids(&["B"])).await.unwrap();
                uow.delete_all_records(EntityKind::Tag).await.unwrap();
                uow.insert_records(EntityKind::Tag, &[Record::new("T", 30), Record::new("U", 31)])
                    .await
                    .unwrap();
                uow.delete_all_tombstones().await.unwrap();
                uow.insert_tombstones(&[Tombstone::new("Y", EntityKind::Tag, 5)])
                    .await
                    .unwrap();
            }

            let mut uow = store.begin().await.unwrap();
            let mut items = uow
                .records_changed_since(EntityKind::Item, None, &HashSet::new())
                .await
                .unwrap();
            items.sort_by(|a, b| a.id.cmp(&b.id));
            assert_eq!(items, vec![Record::new("A", 1), Record::new("B", 2)], "{name}");

            let tags = uow
                .records_changed_since(EntityKind::Tag, None, &HashSet::new())
                .await
                .unwrap();
            assert_eq!(tags, vec![Record::new("T", 3)], "{name}");

            let tombstones = uow.tombstones_since(None, &HashSet::new()).await.unwrap();
            assert_eq!(tombstones, vec![Tombstone::new("X", EntityKind::Item, 4)], "{name}");
        }
    }

    #[tokio::test]
    async fn test_uncommitted_unit_is_discarded() {
        for (name, store) in backends().await {
            {
                let mut uow = store.begin().await.unwrap();
                uow.insert_records(EntityKind::Item, &[Record::new("A", 1)])
                    .await
                    .unwrap();
            }

            let mut uow = store.begin().await.unwrap();
            let found = uow.find_records(EntityKind::Item, &ids(&["A"])).await.unwrap();
            assert!(found.is_empty(), "{name}");
        }
    }
}
