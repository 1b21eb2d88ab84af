//! Sync data types
//!
//! Defines the wire and domain types of the delta sync protocol:
//! - Records (items and tags) with client-assigned change timestamps
//! - Tombstones recording deletions
//! - Sync request/response bodies and the bulk snapshot

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Entity classes that can be synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "i")]
    Item,
    #[serde(rename = "t")]
    Tag,
}

impl EntityKind {
    /// Wire code used in tombstones
    pub fn code(self) -> &'static str {
        match self {
            EntityKind::Item => "i",
            EntityKind::Tag => "t",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(EntityKind::Item),
            "t" => Some(EntityKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Item => f.write_str("item"),
            EntityKind::Tag => f.write_str("tag"),
        }
    }
}

/// An item or tag as authored by a client
///
/// Everything besides `id` and `changed_ts` is kept verbatim, in its original key
/// order, in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Client-generated, globally unique id
    pub id: String,
    /// Timestamp set by the authoring client
    pub changed_ts: i64,
    /// Remaining document fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, changed_ts: i64) -> Self {
        Self {
            id: id.into(),
            changed_ts,
            payload: Map::new(),
        }
    }

    /// Builder-style payload field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Validate a raw JSON document into a record
    pub fn from_json(kind: EntityKind, value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(SyncError::malformed(format!("{} must be a JSON object", kind)));
        };

        let id = match map.shift_remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => {
                return Err(SyncError::malformed(format!(
                    "{} id must be a non-empty string",
                    kind
                )))
            }
            None => return Err(SyncError::malformed(format!("{} is missing id", kind))),
        };

        let changed_ts = match map.shift_remove("changed_ts") {
            Some(v) => v.as_i64().ok_or_else(|| {
                SyncError::malformed(format!("{} {} has a non-integer changed_ts", kind, id))
            })?,
            None => {
                return Err(SyncError::malformed(format!(
                    "{} {} is missing changed_ts",
                    kind, id
                )))
            }
        };

        Ok(Self {
            id,
            changed_ts,
            payload: map,
        })
    }
}

/// Persisted marker for a deleted item or tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Id of the deleted record
    pub sync_id: String,
    /// Collection the record lived in
    pub entity_type: EntityKind,
    /// Deletion timestamp
    pub ts: i64,
}

impl Tombstone {
    pub fn new(sync_id: impl Into<String>, entity_type: EntityKind, ts: i64) -> Self {
        Self {
            sync_id: sync_id.into(),
            entity_type,
            ts,
        }
    }

    /// Validate a raw JSON deletion request into a tombstone
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(SyncError::malformed("deletion must be a JSON object"));
        };

        let sync_id = match map.get("sync_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                return Err(SyncError::malformed(
                    "deletion sync_id must be a non-empty string",
                ))
            }
        };

        let entity_type = map
            .get("entity_type")
            .and_then(Value::as_str)
            .and_then(EntityKind::from_code)
            .ok_or_else(|| {
                SyncError::malformed(format!(
                    "deletion {} entity_type must be \"i\" or \"t\"",
                    sync_id
                ))
            })?;

        let ts = map.get("ts").and_then(Value::as_i64).ok_or_else(|| {
            SyncError::malformed(format!("deletion {} is missing an integer ts", sync_id))
        })?;

        Ok(Self {
            sync_id,
            entity_type,
            ts,
        })
    }
}

/// Changes pushed by a client, as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChanges {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub tags: Vec<Value>,
    #[serde(default)]
    pub deletions: Vec<Value>,
}

/// Request body of a delta sync
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    /// Cursor from the previous response; absent on first sync
    #[serde(default)]
    pub last_sync_ts: Option<i64>,
    /// Client clock offset, echoed back untouched
    #[serde(default)]
    pub time_delta_ms: Option<i64>,
    #[serde(default)]
    pub changes: RawChanges,
}

/// Validated change set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub items: Vec<Record>,
    pub tags: Vec<Record>,
    pub deletions: Vec<Tombstone>,
}

impl RawChanges {
    /// Validate every document before the store is touched
    pub fn validate(self) -> Result<ChangeSet> {
        Ok(ChangeSet {
            items: validate_records(EntityKind::Item, self.items)?,
            tags: validate_records(EntityKind::Tag, self.tags)?,
            deletions: self
                .deletions
                .into_iter()
                .map(Tombstone::from_json)
                .collect::<Result<_>>()?,
        })
    }
}

impl SyncRequest {
    /// Client cursor, with zero treated as "never synchronized"
    pub fn since(&self) -> Option<i64> {
        self.last_sync_ts.filter(|ts| *ts != 0)
    }
}

fn validate_records(kind: EntityKind, values: Vec<Value>) -> Result<Vec<Record>> {
    values
        .into_iter()
        .map(|value| Record::from_json(kind, value))
        .collect()
}

/// Response body of a delta sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    /// New cursor for the client to persist
    pub sync_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_delta_ms: Option<i64>,
    pub items: Vec<Record>,
    pub tags: Vec<Record>,
    pub deletions_to_add: Vec<Tombstone>,
}

/// Full contents of every collection, as received for a bulk replace
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub tags: Vec<Value>,
    #[serde(default)]
    pub deletions: Vec<Value>,
}

impl RawSnapshot {
    pub fn validate(self) -> Result<Snapshot> {
        let changes = RawChanges {
            items: self.items,
            tags: self.tags,
            deletions: self.deletions,
        }
        .validate()?;

        Ok(Snapshot {
            items: changes.items,
            tags: changes.tags,
            deletions: changes.deletions,
        })
    }
}

/// Full contents of every collection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub items: Vec<Record>,
    pub tags: Vec<Record>,
    pub deletions: Vec<Tombstone>,
}
