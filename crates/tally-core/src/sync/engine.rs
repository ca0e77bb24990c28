//! Reconciliation cycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{CycleGuard, EntryView, SyncReport};
use crate::config::EngineConfig;
use crate::models::{EntryDraft, LocalId, LocalRecord, NewRemoteRecord, RemoteId, RemoteRecord};
use crate::network::NetworkObserver;
use crate::remote::{insert_chunked, ChunkedInsertReport, RemoteEntries, DEFAULT_CHUNK_SIZE};
use crate::services::{EntryStore, PushAcceptance};
use crate::state::SyncState;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub push_delay: Duration,
    /// 0 keeps retrying tombstones forever.
    pub tombstone_max_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SyncSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            push_delay: config.push_delay,
            tombstone_max_attempts: config.tombstone_max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(SyncReport),
    /// Another cycle held the guard; this trigger was dropped.
    AlreadyRunning,
    Offline,
}

/// Orchestrates push, pull and deletion propagation against one remote.
pub struct SyncEngine<R> {
    store: EntryStore,
    remote: Arc<R>,
    network: NetworkObserver,
    guard: CycleGuard,
    view: EntryView,
    settings: SyncSettings,
    last_error: Arc<Mutex<Option<String>>>,
}

impl<R> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: Arc::clone(&self.remote),
            network: self.network.clone(),
            guard: self.guard.clone(),
            view: self.view.clone(),
            settings: self.settings,
            last_error: Arc::clone(&self.last_error),
        }
    }
}

impl<R: RemoteEntries> SyncEngine<R> {
    pub fn new(
        store: EntryStore,
        remote: Arc<R>,
        network: NetworkObserver,
        view: EntryView,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            remote,
            network,
            guard: CycleGuard::new(),
            view,
            settings,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub const fn network(&self) -> &NetworkObserver {
        &self.network
    }

    pub const fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    pub const fn view(&self) -> &EntryView {
        &self.view
    }

    pub fn is_syncing(&self) -> bool {
        self.guard.is_running()
    }

    pub fn state(&self) -> SyncState {
        if self.guard.is_running() {
            SyncState::Syncing
        } else if !self.network.is_online() {
            SyncState::Offline
        } else if self.last_error().is_some() {
            SyncState::Error
        } else {
            SyncState::Synced
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Run one full cycle: deletions, pushes, pull and merge, view reload.
    ///
    /// Per-entry remote failures are counted in the report and retried next
    /// cycle. Only a failed listing or a local store error ends the cycle
    /// with an error; the view is reloaded either way.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        if !self.network.is_online() {
            debug!("Skipping reconciliation while offline");
            return Ok(CycleOutcome::Offline);
        }
        let Some(_token) = self.guard.try_begin() else {
            debug!("Reconciliation already running; trigger dropped");
            return Ok(CycleOutcome::AlreadyRunning);
        };

        info!("Reconciliation cycle started");
        let mut report = SyncReport::default();
        let phases = self.run_phases(&mut report).await;
        let reload = self.reload_view().await;

        match phases.and(reload) {
            Ok(visible) => {
                report.visible = visible;
                self.set_last_error(None);
                info!(%report, "Reconciliation cycle finished");
                Ok(CycleOutcome::Completed(report))
            }
            Err(error) => {
                warn!(%error, "Reconciliation cycle failed");
                self.set_last_error(Some(error.to_string()));
                Err(error)
            }
        }
    }

    async fn run_phases(&self, report: &mut SyncReport) -> Result<()> {
        self.propagate_deletions(report).await?;
        self.push_unsynced(report).await?;
        self.pull_and_merge(report).await
    }

    /// Reload the visible entries from the store; returns how many there are.
    pub async fn reload_view(&self) -> Result<usize> {
        let entries = self.store.list_visible(None).await?;
        let visible = entries.len();
        self.view.replace(entries);
        Ok(visible)
    }

    async fn propagate_deletions(&self, report: &mut SyncReport) -> Result<()> {
        for tombstone in self.store.list_tombstones().await? {
            if self.is_abandoned(&tombstone) {
                report.tombstones_abandoned += 1;
                continue;
            }
            if self.propagate_one(&tombstone).await? {
                report.deletions_propagated += 1;
            } else {
                report.deletion_failures += 1;
            }
        }
        Ok(())
    }

    const fn is_abandoned(&self, tombstone: &LocalRecord) -> bool {
        self.settings.tombstone_max_attempts > 0
            && tombstone.delete_attempts >= self.settings.tombstone_max_attempts
    }

    /// Delete the tombstone's remote copy, purging it locally on success.
    async fn propagate_one(&self, tombstone: &LocalRecord) -> Result<bool> {
        let Some(remote_id) = tombstone.remote_id.as_ref() else {
            // Nothing to propagate; such a tombstone is garbage.
            self.store.delete(tombstone.local_id).await?;
            return Ok(true);
        };

        match self.remote.delete_by_id(remote_id).await {
            Ok(()) => {
                self.store.delete(tombstone.local_id).await?;
                debug!(local_id = %tombstone.local_id, %remote_id, "Propagated deletion");
                Ok(true)
            }
            Err(error) => {
                let attempts = self.store.record_delete_failure(tombstone.local_id).await?;
                warn!(
                    local_id = %tombstone.local_id,
                    %remote_id,
                    attempts,
                    %error,
                    "Remote delete failed; tombstone kept"
                );
                if self.settings.tombstone_max_attempts > 0
                    && attempts >= self.settings.tombstone_max_attempts
                {
                    warn!(
                        local_id = %tombstone.local_id,
                        "Tombstone reached its retry limit and will no longer be retried"
                    );
                }
                Ok(false)
            }
        }
    }

    async fn push_unsynced(&self, report: &mut SyncReport) -> Result<()> {
        let pending = self.store.list_unsynced().await?;
        for (index, record) in pending.iter().enumerate() {
            if index > 0 && !self.settings.push_delay.is_zero() {
                tokio::time::sleep(self.settings.push_delay).await;
            }
            match self.push_one(record).await? {
                Some(PushAcceptance::Accepted) => report.pushed += 1,
                Some(PushAcceptance::Orphaned) => report.orphaned += 1,
                None => report.push_failures += 1,
            }
        }
        Ok(())
    }

    /// Insert one entry remotely. `None` means the service refused or could
    /// not be reached and the entry stays pending.
    async fn push_one(&self, record: &LocalRecord) -> Result<Option<PushAcceptance>> {
        let payload = NewRemoteRecord::from(record);
        match self.remote.insert(&payload).await {
            Ok(inserted) => {
                let acceptance = self.store.accept_push(record, &inserted.id).await?;
                debug!(local_id = %record.local_id, remote_id = %inserted.id, ?acceptance, "Pushed entry");
                Ok(Some(acceptance))
            }
            Err(error) if error.is_unreachable() => {
                info!(local_id = %record.local_id, %error, "Remote unreachable; entry stays pending");
                Ok(None)
            }
            Err(error) => {
                warn!(local_id = %record.local_id, %error, "Push rejected; entry stays pending");
                Ok(None)
            }
        }
    }

    async fn pull_and_merge(&self, report: &mut SyncReport) -> Result<()> {
        let remote_rows = self.remote.select_all().await?;
        self.merge(&remote_rows, report).await
    }

    /// Add remote entries missing locally. Existing entries are never
    /// overwritten and tombstoned identities are never re-created.
    async fn merge(&self, remote_rows: &[RemoteRecord], report: &mut SyncReport) -> Result<()> {
        let mut live = HashSet::<RemoteId>::new();
        let mut tombstoned = HashSet::<RemoteId>::new();
        for record in self.store.get_all().await? {
            if let Some(remote_id) = record.remote_id {
                if record.deleted {
                    tombstoned.insert(remote_id);
                } else {
                    live.insert(remote_id);
                }
            }
        }

        for row in remote_rows {
            if tombstoned.contains(&row.id) {
                report.resurrections_blocked += 1;
                continue;
            }
            if live.contains(&row.id) {
                continue;
            }

            let draft = EntryDraft::from_remote(row);
            if draft.name.is_empty() {
                warn!(remote_id = %row.id, "Skipping remote entry with empty name");
                continue;
            }
            match self.store.add_pulled(&draft).await {
                Ok(Some(_)) => {
                    live.insert(row.id.clone());
                    report.pulled += 1;
                }
                Ok(None) => {
                    debug!(remote_id = %row.id, "Remote entry already stored");
                    live.insert(row.id.clone());
                }
                Err(error) => {
                    warn!(remote_id = %row.id, %error, "Failed to store pulled entry");
                }
            }
        }
        Ok(())
    }

    /// Push a freshly submitted entry right away when online and idle.
    /// Returns the entry as stored afterwards.
    pub async fn push_now(&self, id: LocalId) -> Result<Option<LocalRecord>> {
        if self.network.is_online() {
            if let Some(_token) = self.guard.try_begin() {
                if let Some(record) = self.store.get(id).await? {
                    if record.is_pending() {
                        self.push_one(&record).await?;
                    }
                }
            }
        }

        let stored = self.store.get(id).await?;
        if let Some(record) = stored.as_ref() {
            self.view.upsert(record.clone());
        }
        Ok(stored)
    }

    /// Propagate a fresh tombstone right away when online and idle. The
    /// tombstone stays for the next cycle otherwise.
    pub async fn propagate_now(&self, tombstone: &LocalRecord) -> Result<bool> {
        if !self.network.is_online() {
            return Ok(false);
        }
        let Some(_token) = self.guard.try_begin() else {
            return Ok(false);
        };
        self.propagate_one(tombstone).await
    }

    /// Upload pending entries in chunks and mark accepted ones synced.
    ///
    /// Returns `None` when offline or a cycle is running; the entries then
    /// wait for the next cycle.
    pub async fn bulk_upload(&self, records: &[LocalRecord]) -> Result<Option<ChunkedInsertReport>> {
        if !self.network.is_online() {
            return Ok(None);
        }
        let Some(_token) = self.guard.try_begin() else {
            return Ok(None);
        };

        let pending = records
            .iter()
            .filter(|record| record.is_pending())
            .collect::<Vec<_>>();
        let payloads = pending
            .iter()
            .map(|record| NewRemoteRecord::from(*record))
            .collect::<Vec<_>>();

        let report = insert_chunked(self.remote.as_ref(), &payloads, DEFAULT_CHUNK_SIZE).await;
        for (offset, inserted) in &report.inserted {
            if let Some(record) = pending.get(*offset) {
                self.store.accept_push(record, &inserted.id).await?;
            }
        }
        info!(
            uploaded = report.inserted_count(),
            failed = report.failed_count(),
            "Bulk upload finished"
        );
        Ok(Some(report))
    }
}
