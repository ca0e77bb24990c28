//! Shared local store handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{Database, EntryRepository, LibSqlEntryRepository};
use crate::models::{EntryDraft, LocalId, LocalRecord, RemoteId};
use crate::Result;

/// Result of retiring an entry at the user's request.
#[derive(Debug, Clone, PartialEq)]
pub enum Deletion {
    /// Never synced: removed outright.
    Purged,
    /// Synced: kept as a tombstone until the remote delete lands.
    Tombstoned(LocalRecord),
    Missing,
}

/// What happened when recording a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAcceptance {
    Accepted,
    /// The entry was deleted locally while the insert was in flight. It now
    /// exists as a tombstone so the remote copy gets removed.
    Orphaned,
}

/// Thread-safe handle over the local database. Clones share the connection.
#[derive(Clone)]
pub struct EntryStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EntryStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl EntryStore {
    /// Open the store at `db_path`, creating parent directories.
    ///
    /// A file that is not a database is moved aside and a fresh store is
    /// created in its place.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is unreadable: {}. Moving it aside.",
                    db_path.display(),
                    error
                );
                quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// In-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub async fn schema_version(&self) -> Result<i32> {
        let db = self.db.lock().await;
        db.schema_version().await
    }

    pub async fn get(&self, id: LocalId) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).get(id).await
    }

    pub async fn get_all(&self) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).get_all().await
    }

    /// Insert a new entry and return it as stored.
    pub async fn add(&self, draft: &EntryDraft) -> Result<LocalRecord> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        let id = repo.add(draft).await?;
        Ok(LocalRecord::from_draft(id, draft.clone()))
    }

    pub async fn put(&self, record: &LocalRecord) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).put(record).await
    }

    pub async fn delete(&self, id: LocalId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).delete(id).await
    }

    /// Insert an entry pulled from the service unless some row, tombstones
    /// included, already holds its remote identity. `None` means skipped.
    pub async fn add_pulled(&self, draft: &EntryDraft) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        if let Some(remote_id) = &draft.remote_id {
            if repo.find_by_remote_id(remote_id).await?.is_some() {
                return Ok(None);
            }
        }
        let id = repo.add(draft).await?;
        Ok(Some(LocalRecord::from_draft(id, draft.clone())))
    }

    /// Non-deleted entries, newest first.
    pub async fn list_visible(&self, limit: Option<usize>) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list_visible(limit)
            .await
    }

    pub async fn list_unsynced(&self) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list_unsynced()
            .await
    }

    pub async fn list_tombstones(&self) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list_tombstones()
            .await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .pending_count()
            .await
    }

    /// Purge a never-synced entry or turn a synced one into a tombstone.
    pub async fn retire(&self, id: LocalId, at: DateTime<Utc>) -> Result<Deletion> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let Some(mut record) = repo.get(id).await? else {
            return Ok(Deletion::Missing);
        };
        if record.deleted {
            return Ok(Deletion::Tombstoned(record));
        }

        if record.remote_id.is_some() && record.synced {
            record.mark_deleted(at);
            repo.put(&record).await?;
            Ok(Deletion::Tombstoned(record))
        } else {
            repo.delete(id).await?;
            Ok(Deletion::Purged)
        }
    }

    /// Record that the service accepted `record` under `remote_id`.
    pub async fn accept_push(
        &self,
        record: &LocalRecord,
        remote_id: &RemoteId,
    ) -> Result<PushAcceptance> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        if repo.mark_synced(record.local_id, remote_id).await? {
            return Ok(PushAcceptance::Accepted);
        }

        if repo.get(record.local_id).await?.is_none() {
            let mut orphan = record.clone();
            orphan.mark_synced(remote_id.clone());
            orphan.mark_deleted(Utc::now());
            repo.put(&orphan).await?;
        }
        Ok(PushAcceptance::Orphaned)
    }

    /// Count a failed remote delete against the tombstone.
    pub async fn record_delete_failure(&self, id: LocalId) -> Result<u32> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        let Some(mut record) = repo.get(id).await? else {
            return Ok(0);
        };
        record.delete_attempts = record.delete_attempts.saturating_add(1);
        repo.put(&record).await?;
        Ok(record.delete_attempts)
    }
}

fn is_corrupted_db_error(error: &crate::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("file is not a database") || message.contains("file is encrypted")
}

fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        let timestamp = Utc::now().timestamp_millis();
        let base_name = db_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("tally.db");
        let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

        std::fs::rename(db_path, &backup_path)?;
        tracing::warn!(
            "Moved unreadable local store from {} to {}",
            db_path.display(),
            backup_path.display()
        );
    }

    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
        return Ok(());
    };
    let sidecar_prefix = format!("{base_name}-");

    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with(&sidecar_prefix) {
            let path = entry.path();
            std::fs::remove_file(&path)?;
            tracing::warn!("Removed stale store file {}", path.display());
        }
    }

    Ok(())
}
