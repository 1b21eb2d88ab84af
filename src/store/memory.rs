//! In-memory record store
//!
//! A unit of work holds the store lock for its whole lifetime and writes straight into
//! the collections, logging how to undo each write. Commit discards the log; dropping
//! an uncommitted unit replays it backwards.

use std::collections::{HashMap, HashSet};
use std::mem;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::{Store, StoreResult, UnitOfWork};
use crate::sync::{EntityKind, Record, Tombstone};

#[derive(Debug, Default)]
struct Collections {
    items: HashMap<String, Record>,
    tags: HashMap<String, Record>,
    deletions: HashMap<String, Tombstone>,
}

impl Collections {
    fn records(&self, kind: EntityKind) -> &HashMap<String, Record> {
        match kind {
            EntityKind::Item => &self.items,
            EntityKind::Tag => &self.tags,
        }
    }

    fn records_mut(&mut self, kind: EntityKind) -> &mut HashMap<String, Record> {
        match kind {
            EntityKind::Item => &mut self.items,
            EntityKind::Tag => &mut self.tags,
        }
    }
}

/// Inverse of one write
#[derive(Debug)]
enum Undo {
    /// Put back (or remove, if `None`) the record that was under `id`
    Record {
        kind: EntityKind,
        id: String,
        previous: Option<Record>,
    },
    /// Restore a collection emptied by a delete-all
    Records {
        kind: EntityKind,
        previous: HashMap<String, Record>,
    },
    /// Remove a tombstone inserted by this unit
    Tombstone { sync_id: String },
    Tombstones { previous: HashMap<String, Tombstone> },
}

impl Undo {
    fn apply(self, collections: &mut Collections) {
        match self {
            Undo::Record { kind, id, previous } => {
                let records = collections.records_mut(kind);
                match previous {
                    Some(record) => {
                        records.insert(id, record);
                    }
                    None => {
                        records.remove(&id);
                    }
                }
            }
            Undo::Records { kind, previous } => *collections.records_mut(kind) = previous,
            Undo::Tombstone { sync_id } => {
                collections.deletions.remove(&sync_id);
            }
            Undo::Tombstones { previous } => collections.deletions = previous,
        }
    }
}

/// Record store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn UnitOfWork + 'a>> {
        Ok(Box::new(MemoryUnitOfWork {
            guard: self.state.lock().await,
            undo: Vec::new(),
        }))
    }
}

struct MemoryUnitOfWork<'a> {
    guard: MutexGuard<'a, Collections>,
    undo: Vec<Undo>,
}

impl Drop for MemoryUnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.undo.is_empty() {
            tracing::debug!("Rolling back {} in-memory writes", self.undo.len());
        }
        while let Some(undo) = self.undo.pop() {
            undo.apply(&mut self.guard);
        }
    }
}

#[async_trait]
impl<'a> UnitOfWork for MemoryUnitOfWork<'a> {
    async fn find_records(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<Vec<Record>> {
        let records = self.guard.records(kind);
        let unique: HashSet<&String> = ids.iter().collect();

        Ok(unique
            .into_iter()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }

    async fn insert_records(&mut self, kind: EntityKind, records: &[Record]) -> StoreResult<()> {
        let collection = self.guard.records_mut(kind);
        for record in records {
            let previous = collection.insert(record.id.clone(), record.clone());
            self.undo.push(Undo::Record {
                kind,
                id: record.id.clone(),
                previous,
            });
        }
        Ok(())
    }

    async fn replace_record(&mut self, kind: EntityKind, record: &Record) -> StoreResult<()> {
        if let Some(existing) = self.guard.records_mut(kind).get_mut(&record.id) {
            let previous = mem::replace(existing, record.clone());
            self.undo.push(Undo::Record {
                kind,
                id: record.id.clone(),
                previous: Some(previous),
            });
        }
        Ok(())
    }

    async fn delete_records(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<u64> {
        let collection = self.guard.records_mut(kind);
        let mut deleted = 0;
        for id in ids {
            if let Some(previous) = collection.remove(id) {
                deleted += 1;
                self.undo.push(Undo::Record {
                    kind,
                    id: id.clone(),
                    previous: Some(previous),
                });
            }
        }
        Ok(deleted)
    }

    async fn delete_all_records(&mut self, kind: EntityKind) -> StoreResult<u64> {
        let previous = mem::take(self.guard.records_mut(kind));
        let deleted = previous.len() as u64;
        self.undo.push(Undo::Records { kind, previous });
        Ok(deleted)
    }

    async fn records_changed_since(
        &mut self,
        kind: EntityKind,
        since: Option<i64>,
        exclude: &HashSet<String>,
    ) -> StoreResult<Vec<Record>> {
        Ok(self
            .guard
            .records(kind)
            .values()
            .filter(|record| since.map_or(true, |ts| record.changed_ts > ts))
            .filter(|record| !exclude.contains(&record.id))
            .cloned()
            .collect())
    }

    async fn find_tombstones(&mut self, sync_ids: &[String]) -> StoreResult<Vec<Tombstone>> {
        let unique: HashSet<&String> = sync_ids.iter().collect();

        Ok(unique
            .into_iter()
            .filter_map(|id| self.guard.deletions.get(id).cloned())
            .collect())
    }

    async fn insert_tombstones(&mut self, tombstones: &[Tombstone]) -> StoreResult<()> {
        for tombstone in tombstones {
            if self.guard.deletions.contains_key(&tombstone.sync_id) {
                continue;
            }
            self.guard
                .deletions
                .insert(tombstone.sync_id.clone(), tombstone.clone());
            self.undo.push(Undo::Tombstone {
                sync_id: tombstone.sync_id.clone(),
            });
        }
        Ok(())
    }

    async fn delete_all_tombstones(&mut self) -> StoreResult<u64> {
        let previous = mem::take(&mut self.guard.deletions);
        let deleted = previous.len() as u64;
        self.undo.push(Undo::Tombstones { previous });
        Ok(deleted)
    }

    async fn tombstones_since(
        &mut self,
        since: Option<i64>,
        exclude: &HashSet<String>,
    ) -> StoreResult<Vec<Tombstone>> {
        Ok(self
            .guard
            .deletions
            .values()
            .filter(|tombstone| since.map_or(true, |ts| tombstone.ts > ts))
            .filter(|tombstone| !exclude.contains(&tombstone.sync_id))
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.undo.clear();
        Ok(())
    }
}
