//! Change-set reconciliation
//!
//! Merges one entity class's incoming records into the store. The whole batch is
//! validated against the stored versions before anything is written, so a conflict
//! leaves the collection exactly as it was.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SyncError};
use crate::store::UnitOfWork;

use super::types::{EntityKind, Record};

/// Writes decided for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Records with no stored counterpart
    pub inserts: Vec<Record>,
    /// Records replacing a stored version with an older or equal `changed_ts`
    pub updates: Vec<Record>,
}

/// Last-write-wins reconciler for one entity class
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    kind: EntityKind,
}

impl Reconciler {
    pub fn new(kind: EntityKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Partition `incoming` into inserts and updates against the `existing` records
    ///
    /// Fails with [`SyncError::Conflict`] on the first record whose `changed_ts` is
    /// older than the stored one. Equal timestamps count as an update. When an id
    /// occurs more than once, every occurrence is checked and the last one is kept.
    pub fn plan(&self, incoming: &[Record], existing: Vec<Record>) -> Result<ReconcilePlan> {
        let existing: HashMap<String, Record> = existing
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        for record in incoming {
            if let Some(stored) = existing.get(&record.id) {
                if record.changed_ts < stored.changed_ts {
                    return Err(SyncError::Conflict {
                        kind: self.kind,
                        id: record.id.clone(),
                        incoming_ts: record.changed_ts,
                        stored_ts: stored.changed_ts,
                    });
                }
            }
        }

        let last_index: HashMap<&str, usize> = incoming
            .iter()
            .enumerate()
            .map(|(index, record)| (record.id.as_str(), index))
            .collect();

        let mut plan = ReconcilePlan::default();
        for (index, record) in incoming.iter().enumerate() {
            if last_index[record.id.as_str()] != index {
                continue;
            }

            if existing.contains_key(&record.id) {
                plan.updates.push(record.clone());
            } else {
                plan.inserts.push(record.clone());
            }
        }

        Ok(plan)
    }

    /// Reconcile `incoming` against the store and return the ids processed
    pub async fn reconcile(
        &self,
        uow: &mut dyn UnitOfWork,
        incoming: &[Record],
    ) -> Result<HashSet<String>> {
        let ids: Vec<String> = incoming
            .iter()
            .map(|record| record.id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let existing = uow.find_records(self.kind, &ids).await?;
        let plan = self.plan(incoming, existing)?;

        if !plan.inserts.is_empty() {
            uow.insert_records(self.kind, &plan.inserts).await?;
        }
        for record in &plan.updates {
            uow.replace_record(self.kind, record).await?;
        }

        tracing::debug!(
            "Reconciled {} {}s: {} inserted, {} updated",
            ids.len(),
            self.kind,
            plan.inserts.len(),
            plan.updates.len()
        );

        Ok(ids.into_iter().collect())
    }
}
