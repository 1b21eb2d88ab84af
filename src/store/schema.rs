//! Database schema initialization

use sqlx::SqlitePool;

use super::StoreResult;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Items: one live document per client id
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    changed_ts INTEGER NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_items_changed_ts ON items(changed_ts);

-- Tags: same shape as items
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    changed_ts INTEGER NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_tags_changed_ts ON tags(changed_ts);

-- Deletions: at most one tombstone per deleted id
CREATE TABLE IF NOT EXISTS deletions (
    sync_id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL CHECK (entity_type IN ('i', 't')),
    ts INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deletions_ts ON deletions(ts);
"#;
