//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
pub(crate) const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: entries table
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // AUTOINCREMENT keeps local ids from ever being reused
            "CREATE TABLE IF NOT EXISTS entries (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id TEXT,
                name TEXT NOT NULL,
                language TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                accuracy REAL,
                timestamp INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_entries_synced ON entries(synced)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await
}

/// Migration to version 2: tombstones and remote identity lookup
///
/// Existing rows pick up `deleted = 0` from the column default.
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "ALTER TABLE entries ADD COLUMN deleted INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE entries ADD COLUMN deleted_at INTEGER",
            "ALTER TABLE entries ADD COLUMN delete_attempts INTEGER NOT NULL DEFAULT 0",
            "CREATE INDEX IF NOT EXISTS idx_entries_remote_id ON entries(remote_id)",
            "CREATE INDEX IF NOT EXISTS idx_entries_deleted ON entries(deleted)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_live_remote_id
             ON entries(remote_id)
             WHERE remote_id IS NOT NULL AND deleted = 0",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await
}

/// Run one migration's statements inside a transaction.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated entry store to version {version}");
    Ok(())
}
