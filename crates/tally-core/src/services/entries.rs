//! Presentation-facing entry operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::{Deletion, EntryStore};
use crate::models::{EntryDraft, LocalId, LocalRecord, Location};
use crate::remote::RemoteEntries;
use crate::state::SyncState;
use crate::sync::{CycleOutcome, EntryView, SyncEngine};
use crate::Result;

/// Outcome of importing entries from an export file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub uploaded: usize,
    /// Entries left pending for the next cycle.
    pub pending: usize,
}

/// The operations a UI (or the CLI) calls. Writes always land locally first;
/// remote work is opportunistic when a sync engine is attached.
pub struct EntryService<R> {
    store: EntryStore,
    view: EntryView,
    engine: Option<SyncEngine<R>>,
    loading: Arc<AtomicBool>,
}

impl<R> Clone for EntryService<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            view: self.view.clone(),
            engine: self.engine.clone(),
            loading: Arc::clone(&self.loading),
        }
    }
}

impl<R: RemoteEntries> EntryService<R> {
    /// Local-only service: entries stay pending.
    pub fn local(store: EntryStore) -> Self {
        Self {
            store,
            view: EntryView::new(),
            engine: None,
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Service backed by `engine`; shares the engine's view.
    pub fn with_engine(store: EntryStore, engine: SyncEngine<R>) -> Self {
        Self {
            store,
            view: engine.view().clone(),
            engine: Some(engine),
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub const fn store(&self) -> &EntryStore {
        &self.store
    }

    pub const fn engine(&self) -> Option<&SyncEngine<R>> {
        self.engine.as_ref()
    }

    /// Populate the view from the store.
    pub async fn load(&self) -> Result<()> {
        self.loading.store(true, Ordering::SeqCst);
        let result = self.store.list_visible(None).await;
        self.loading.store(false, Ordering::SeqCst);
        self.view.replace(result?);
        Ok(())
    }

    /// Record a new entry. Succeeds whenever the local write succeeds; the
    /// returned entry shows whether the opportunistic push got through.
    pub async fn submit_entry(&self, name: &str, location: Option<Location>) -> Result<LocalRecord> {
        let draft = EntryDraft::new(name, location)?;
        let record = self.store.add(&draft).await?;
        info!(local_id = %record.local_id, language = %record.language, "Entry recorded");
        self.view.upsert(record.clone());

        let Some(engine) = self.engine.as_ref() else {
            return Ok(record);
        };
        match engine.push_now(record.local_id).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Ok(record),
            Err(error) => {
                warn!(local_id = %record.local_id, %error, "Immediate push failed; entry stays pending");
                Ok(record)
            }
        }
    }

    /// Remove an entry from the user's view immediately. Never-synced
    /// entries are purged; synced ones become tombstones for the next cycle.
    pub async fn delete_entry(&self, id: LocalId) -> Result<Deletion> {
        let deletion = self.store.retire(id, Utc::now()).await?;
        self.view.remove(id);

        if let (Deletion::Tombstoned(tombstone), Some(engine)) = (&deletion, self.engine.as_ref()) {
            if let Err(error) = engine.propagate_now(tombstone).await {
                warn!(local_id = %id, %error, "Immediate remote delete failed; will retry");
            }
        }
        Ok(deletion)
    }

    /// Visible entries, newest first.
    pub fn current_entries(&self) -> Vec<LocalRecord> {
        self.view.snapshot()
    }

    pub fn is_syncing(&self) -> bool {
        self.engine.as_ref().is_some_and(SyncEngine::is_syncing)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn sync_state(&self) -> SyncState {
        self.engine
            .as_ref()
            .map_or(SyncState::Offline, SyncEngine::state)
    }

    /// Run one reconciliation cycle. Without an engine this only reloads.
    pub async fn sync_now(&self) -> Result<CycleOutcome> {
        match self.engine.as_ref() {
            Some(engine) => engine.run_cycle().await,
            None => {
                self.load().await?;
                Ok(CycleOutcome::Offline)
            }
        }
    }

    /// Add imported drafts locally, then upload them in chunks when possible.
    pub async fn import(&self, drafts: Vec<EntryDraft>) -> Result<ImportReport> {
        let mut records = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let draft = EntryDraft {
                remote_id: None,
                synced: false,
                ..draft
            };
            records.push(self.store.add(&draft).await?);
        }

        let mut report = ImportReport {
            imported: records.len(),
            uploaded: 0,
            pending: records.len(),
        };

        if let Some(engine) = self.engine.as_ref() {
            if let Some(upload) = engine.bulk_upload(&records).await? {
                report.uploaded = upload.inserted_count();
                report.pending = report.imported - report.uploaded;
            }
        }

        self.load().await?;
        info!(
            imported = report.imported,
            uploaded = report.uploaded,
            "Import finished"
        );
        Ok(report)
    }
}
