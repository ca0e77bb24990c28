//! Entry repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::{params, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{EntryDraft, Language, LocalId, LocalRecord, Location, RemoteId};
use crate::util::datetime_from_millis;

const SELECT_COLUMNS: &str = "SELECT local_id, remote_id, name, language, latitude, longitude,
        accuracy, timestamp, synced, deleted, deleted_at, delete_attempts
     FROM entries";

/// Trait for local entry storage operations
///
/// Each operation is atomic for a single record. Batches built from several
/// calls are not, and callers tolerate partial application.
#[allow(async_fn_in_trait)]
pub trait EntryRepository {
    /// Get a record (tombstones included) by local id
    async fn get(&self, id: LocalId) -> Result<Option<LocalRecord>>;

    /// Every record, tombstones included, newest first
    async fn get_all(&self) -> Result<Vec<LocalRecord>>;

    /// Insert a new record and return its assigned local id
    async fn add(&self, draft: &EntryDraft) -> Result<LocalId>;

    /// Idempotent upsert keyed by local id
    async fn put(&self, record: &LocalRecord) -> Result<()>;

    /// Physically remove a record; returns whether a row was removed
    async fn delete(&self, id: LocalId) -> Result<bool>;

    /// Find a record (tombstones included) by remote identity
    async fn find_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<LocalRecord>>;

    /// Non-deleted records, newest first
    async fn list_visible(&self, limit: Option<usize>) -> Result<Vec<LocalRecord>>;

    /// Non-deleted records not yet accepted remotely, oldest first
    async fn list_unsynced(&self) -> Result<Vec<LocalRecord>>;

    /// Deleted records still carrying a remote identity
    async fn list_tombstones(&self) -> Result<Vec<LocalRecord>>;

    /// Set `synced`/`remote_id` on a live record; returns false when the
    /// record is gone or already deleted
    async fn mark_synced(&self, id: LocalId, remote_id: &RemoteId) -> Result<bool>;

    /// Count of live records waiting to be pushed
    async fn pending_count(&self) -> Result<usize>;
}

/// libSQL implementation of `EntryRepository`
pub struct LibSqlEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_records(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<LocalRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    /// Parse a record from a database row
    fn parse_record(row: &Row) -> Result<LocalRecord> {
        let name: String = row.get(2)?;
        let language = row
            .get::<String>(3)?
            .parse()
            .unwrap_or_else(|_| Language::detect(&name));
        let timestamp_ms: i64 = row.get(7)?;

        let location = match (real_column(row, 4)?, real_column(row, 5)?) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
                accuracy: real_column(row, 6)?.unwrap_or(0.0),
            }),
            _ => None,
        };

        Ok(LocalRecord {
            local_id: LocalId::new(row.get(0)?),
            remote_id: text_column(row, 1)?.map(RemoteId::new),
            name,
            language,
            location,
            timestamp: datetime_from_millis(timestamp_ms).ok_or_else(|| {
                Error::Database(format!("invalid entry timestamp {timestamp_ms}"))
            })?,
            synced: row.get::<i32>(8)? != 0,
            deleted: row.get::<i32>(9)? != 0,
            deleted_at: integer_column(row, 10)?.and_then(datetime_from_millis),
            delete_attempts: u32::try_from(row.get::<i64>(11)?).unwrap_or(u32::MAX),
        })
    }
}

impl EntryRepository for LibSqlEntryRepository<'_> {
    async fn get(&self, id: LocalId) -> Result<Option<LocalRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE local_id = ?1");
        Ok(self
            .query_records(&sql, params![id.get()])
            .await?
            .into_iter()
            .next())
    }

    async fn get_all(&self) -> Result<Vec<LocalRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY timestamp DESC, local_id DESC");
        self.query_records(&sql, ()).await
    }

    async fn add(&self, draft: &EntryDraft) -> Result<LocalId> {
        self.conn
            .execute(
                "INSERT INTO entries (
                    remote_id, name, language, latitude, longitude, accuracy,
                    timestamp, synced, deleted, deleted_at, delete_attempts
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, 0)",
                params![
                    text_value(draft.remote_id.as_ref().map(RemoteId::as_str)),
                    draft.name.as_str(),
                    draft.language.as_str(),
                    real_value(draft.location.map(|location| location.latitude)),
                    real_value(draft.location.map(|location| location.longitude)),
                    real_value(draft.location.map(|location| location.accuracy)),
                    draft.timestamp.timestamp_millis(),
                    i64::from(draft.synced)
                ],
            )
            .await?;

        Ok(LocalId::new(self.conn.last_insert_rowid()))
    }

    async fn put(&self, record: &LocalRecord) -> Result<()> {
        // remote_id is write-once: an existing value always wins
        self.conn
            .execute(
                "INSERT INTO entries (
                    local_id, remote_id, name, language, latitude, longitude, accuracy,
                    timestamp, synced, deleted, deleted_at, delete_attempts
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(local_id) DO UPDATE SET
                    remote_id = COALESCE(entries.remote_id, excluded.remote_id),
                    name = excluded.name,
                    language = excluded.language,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    accuracy = excluded.accuracy,
                    timestamp = excluded.timestamp,
                    synced = excluded.synced,
                    deleted = excluded.deleted,
                    deleted_at = excluded.deleted_at,
                    delete_attempts = excluded.delete_attempts",
                params![
                    record.local_id.get(),
                    text_value(record.remote_id.as_ref().map(RemoteId::as_str)),
                    record.name.as_str(),
                    record.language.as_str(),
                    real_value(record.location.map(|location| location.latitude)),
                    real_value(record.location.map(|location| location.longitude)),
                    real_value(record.location.map(|location| location.accuracy)),
                    record.timestamp.timestamp_millis(),
                    i64::from(record.synced),
                    i64::from(record.deleted),
                    integer_value(record.deleted_at.map(|at| at.timestamp_millis())),
                    i64::from(record.delete_attempts)
                ],
            )
            .await?;

        Ok(())
    }

    async fn delete(&self, id: LocalId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM entries WHERE local_id = ?1", params![id.get()])
            .await?;
        Ok(rows > 0)
    }

    async fn find_by_remote_id(&self, remote_id: &RemoteId) -> Result<Option<LocalRecord>> {
        // Prefer the live row when a tombstone shares the identity
        let sql = format!("{SELECT_COLUMNS} WHERE remote_id = ?1 ORDER BY deleted ASC LIMIT 1");
        Ok(self
            .query_records(&sql, params![remote_id.as_str()])
            .await?
            .into_iter()
            .next())
    }

    async fn list_visible(&self, limit: Option<usize>) -> Result<Vec<LocalRecord>> {
        let limit = limit.map_or(-1, |limit| limit as i64);
        let sql = format!(
            "{SELECT_COLUMNS} WHERE deleted = 0 ORDER BY timestamp DESC, local_id DESC LIMIT ?1"
        );
        self.query_records(&sql, params![limit]).await
    }

    async fn list_unsynced(&self) -> Result<Vec<LocalRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE synced = 0 AND deleted = 0 ORDER BY timestamp ASC, local_id ASC"
        );
        self.query_records(&sql, ()).await
    }

    async fn list_tombstones(&self) -> Result<Vec<LocalRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE deleted = 1 AND remote_id IS NOT NULL ORDER BY deleted_at ASC"
        );
        self.query_records(&sql, ()).await
    }

    async fn mark_synced(&self, id: LocalId, remote_id: &RemoteId) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE entries
                 SET synced = 1, remote_id = COALESCE(remote_id, ?2)
                 WHERE local_id = ?1 AND deleted = 0",
                params![id.get(), remote_id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn pending_count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM entries WHERE synced = 0 AND deleted = 0",
                (),
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

fn real_value(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

fn integer_value(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn text_column(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Text(value) => Ok(Some(value)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

fn real_column(row: &Row, idx: i32) -> Result<Option<f64>> {
    match row.get_value(idx)? {
        Value::Real(value) => Ok(Some(value)),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(value) => Ok(Some(value as f64)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "expected number in column {idx}, found {other:?}"
        ))),
    }
}

fn integer_column(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Integer(value) => Ok(Some(value)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}
