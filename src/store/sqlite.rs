//! SQLite record store
//!
//! Items and tags keep `id` and `changed_ts` as columns and the rest of the document
//! as JSON text. Each unit of work is one `BEGIN IMMEDIATE` transaction on a pooled
//! connection, so concurrent requests queue on the write lock instead of failing with
//! `SQLITE_BUSY` when a read is followed by a write.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::Sqlite;

use super::{initialize_schema, Store, StoreResult, UnitOfWork};
use crate::sync::{EntityKind, Record, Tombstone};

/// Upper bound on bound parameters per `IN (...)` query
const ID_CHUNK_SIZE: usize = 500;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Record store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin<'a>(&'a self) -> StoreResult<Box<dyn UnitOfWork + 'a>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Box::new(SqliteUnitOfWork { conn: Some(conn) }))
    }
}

struct SqliteUnitOfWork {
    /// Connection holding the open transaction; `None` once committed
    conn: Option<PoolConnection<Sqlite>>,
}

impl SqliteUnitOfWork {
    fn conn(&mut self) -> &mut SqliteConnection {
        self.conn
            .as_deref_mut()
            .expect("unit of work is consumed by commit")
    }
}

impl Drop for SqliteUnitOfWork {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        // The connection goes back to the pool only after the rollback has run.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        tracing::error!("Failed to roll back unit of work: {}", e);
                        drop(conn.detach());
                    }
                });
            }
            Err(_) => {
                tracing::warn!("No runtime to roll back unit of work, closing its connection");
                drop(conn.detach());
            }
        }
    }
}

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Item => "items",
        EntityKind::Tag => "tags",
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn find_records(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<Vec<Record>> {
        let mut records = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let query = format!(
                "SELECT id, changed_ts, payload FROM {} WHERE id IN ({})",
                table(kind),
                placeholders(chunk.len())
            );

            let mut q = sqlx::query_as::<_, RecordRow>(&query);
            for id in chunk {
                q = q.bind(id);
            }

            for row in q.fetch_all(self.conn()).await? {
                records.push(row.into_record()?);
            }
        }

        Ok(records)
    }

    async fn insert_records(&mut self, kind: EntityKind, records: &[Record]) -> StoreResult<()> {
        let query = format!(
            r#"
            INSERT INTO {} (id, changed_ts, payload) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                changed_ts = excluded.changed_ts,
                payload = excluded.payload
            "#,
            table(kind)
        );

        for record in records {
            sqlx::query(&query)
                .bind(&record.id)
                .bind(record.changed_ts)
                .bind(serde_json::to_string(&record.payload)?)
                .execute(self.conn())
                .await?;
        }

        Ok(())
    }

    async fn replace_record(&mut self, kind: EntityKind, record: &Record) -> StoreResult<()> {
        let query = format!(
            "UPDATE {} SET changed_ts = ?, payload = ? WHERE id = ?",
            table(kind)
        );

        sqlx::query(&query)
            .bind(record.changed_ts)
            .bind(serde_json::to_string(&record.payload)?)
            .bind(&record.id)
            .execute(self.conn())
            .await?;

        Ok(())
    }

    async fn delete_records(&mut self, kind: EntityKind, ids: &[String]) -> StoreResult<u64> {
        let mut deleted = 0;

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let query = format!(
                "DELETE FROM {} WHERE id IN ({})",
                table(kind),
                placeholders(chunk.len())
            );

            let mut q = sqlx::query(&query);
            for id in chunk {
                q = q.bind(id);
            }

            deleted += q.execute(self.conn()).await?.rows_affected();
        }

        Ok(deleted)
    }

    async fn delete_all_records(&mut self, kind: EntityKind) -> StoreResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {}", table(kind)))
            .execute(self.conn())
            .await?;

        Ok(result.rows_affected())
    }

    async fn records_changed_since(
        &mut self,
        kind: EntityKind,
        since: Option<i64>,
        exclude: &HashSet<String>,
    ) -> StoreResult<Vec<Record>> {
        let query = format!(
            "SELECT id, changed_ts, payload FROM {} WHERE ? IS NULL OR changed_ts > ?",
            table(kind)
        );

        let rows = sqlx::query_as::<_, RecordRow>(&query)
            .bind(since)
            .bind(since)
            .fetch_all(self.conn())
            .await?;

        rows.into_iter()
            .filter(|row| !exclude.contains(&row.id))
            .map(RecordRow::into_record)
            .collect()
    }

    async fn find_tombstones(&mut self, sync_ids: &[String]) -> StoreResult<Vec<Tombstone>> {
        let mut tombstones = Vec::with_capacity(sync_ids.len());

        for chunk in sync_ids.chunks(ID_CHUNK_SIZE) {
            let query = format!(
                "SELECT sync_id, entity_type, ts FROM deletions WHERE sync_id IN ({})",
                placeholders(chunk.len())
            );

            let mut q = sqlx::query_as::<_, TombstoneRow>(&query);
            for id in chunk {
                q = q.bind(id);
            }

            tombstones.extend(
                q.fetch_all(self.conn())
                    .await?
                    .into_iter()
                    .filter_map(TombstoneRow::into_tombstone),
            );
        }

        Ok(tombstones)
    }

    async fn insert_tombstones(&mut self, tombstones: &[Tombstone]) -> StoreResult<()> {
        for tombstone in tombstones {
            sqlx::query(
                r#"
                INSERT INTO deletions (sync_id, entity_type, ts) VALUES (?, ?, ?)
                ON CONFLICT(sync_id) DO NOTHING
                "#,
            )
            .bind(&tombstone.sync_id)
            .bind(tombstone.entity_type.code())
            .bind(tombstone.ts)
            .execute(self.conn())
            .await?;
        }

        Ok(())
    }

    async fn delete_all_tombstones(&mut self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM deletions")
            .execute(self.conn())
            .await?;

        Ok(result.rows_affected())
    }

    async fn tombstones_since(
        &mut self,
        since: Option<i64>,
        exclude: &HashSet<String>,
    ) -> StoreResult<Vec<Tombstone>> {
        let rows = sqlx::query_as::<_, TombstoneRow>(
            "SELECT sync_id, entity_type, ts FROM deletions WHERE ? IS NULL OR ts > ?",
        )
        .bind(since)
        .bind(since)
        .fetch_all(self.conn())
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| !exclude.contains(&row.sync_id))
            .filter_map(TombstoneRow::into_tombstone)
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        sqlx::query("COMMIT").execute(this.conn()).await?;
        this.conn = None;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    changed_ts: i64,
    payload: String,
}

impl RecordRow {
    fn into_record(self) -> StoreResult<Record> {
        let payload: Map<String, Value> = serde_json::from_str(&self.payload)?;

        Ok(Record {
            id: self.id,
            changed_ts: self.changed_ts,
            payload,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TombstoneRow {
    sync_id: String,
    entity_type: String,
    ts: i64,
}

impl TombstoneRow {
    fn into_tombstone(self) -> Option<Tombstone> {
        let Some(entity_type) = EntityKind::from_code(&self.entity_type) else {
            tracing::warn!(
                "Skipping tombstone {} with unknown entity type {:?}",
                self.sync_id,
                self.entity_type
            );
            return None;
        };

        Some(Tombstone {
            sync_id: self.sync_id,
            entity_type,
            ts: self.ts,
        })
    }
}
