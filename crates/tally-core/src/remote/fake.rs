//! In-memory remote service for tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use super::{RemoteEntries, RemoteError, RemoteResult};
use crate::models::{NewRemoteRecord, RemoteId, RemoteRecord};

#[derive(Default)]
struct State {
    rows: Vec<RemoteRecord>,
    next_id: u64,
    offline: bool,
    failing_names: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_select: bool,
    insert_calls: usize,
    delete_calls: usize,
    select_calls: usize,
    batch_sizes: Vec<usize>,
}

/// Remote double with per-record, per-identifier and whole-service failure
/// injection.
#[derive(Default)]
pub(crate) struct FakeRemote {
    state: Mutex<State>,
    select_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.offline = offline);
    }

    pub(crate) fn fail_inserts_named(&self, name: &str) {
        self.with_state(|state| state.failing_names.insert(name.to_string()));
    }

    pub(crate) fn clear_insert_failures(&self) {
        self.with_state(|state| state.failing_names.clear());
    }

    pub(crate) fn fail_deletes_for(&self, id: &RemoteId) {
        self.with_state(|state| state.failing_deletes.insert(id.as_str().to_string()));
    }

    pub(crate) fn clear_delete_failures(&self) {
        self.with_state(|state| state.failing_deletes.clear());
    }

    pub(crate) fn fail_select(&self, fail: bool) {
        self.with_state(|state| state.fail_select = fail);
    }

    /// Make `select_all` wait until the returned semaphore gets a permit.
    pub(crate) fn hold_selects(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self
            .select_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&gate));
        gate
    }

    /// Add a row directly, as another device would.
    pub(crate) fn seed(&self, name: &str, timestamp: DateTime<Utc>) -> RemoteId {
        self.with_state(|state| {
            let record = state.allocate(&NewRemoteRecord {
                name: name.to_string(),
                language: crate::models::Language::detect(name),
                latitude: None,
                longitude: None,
                accuracy: None,
                timestamp,
                synced: true,
            });
            let id = record.id.clone();
            state.rows.push(record);
            id
        })
    }

    pub(crate) fn rows(&self) -> Vec<RemoteRecord> {
        self.with_state(|state| state.rows.clone())
    }

    pub(crate) fn contains(&self, id: &RemoteId) -> bool {
        self.with_state(|state| state.rows.iter().any(|row| &row.id == id))
    }

    pub(crate) fn insert_calls(&self) -> usize {
        self.with_state(|state| state.insert_calls)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.with_state(|state| state.delete_calls)
    }

    pub(crate) fn select_calls(&self) -> usize {
        self.with_state(|state| state.select_calls)
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.with_state(|state| state.batch_sizes.clone())
    }
}

impl State {
    fn allocate(&mut self, record: &NewRemoteRecord) -> RemoteRecord {
        self.next_id += 1;
        let now = Utc::now();
        RemoteRecord {
            id: RemoteId::new(self.next_id.to_string()),
            name: record.name.clone(),
            language: Some(record.language.as_str().to_string()),
            latitude: record.latitude,
            longitude: record.longitude,
            accuracy: record.accuracy,
            timestamp: record.timestamp,
            synced: record.synced,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    fn check_reachable(&self) -> RemoteResult<()> {
        if self.offline {
            Err(RemoteError::Unreachable("fake remote is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteEntries for FakeRemote {
    async fn insert(&self, record: &NewRemoteRecord) -> RemoteResult<RemoteRecord> {
        self.with_state(|state| {
            state.insert_calls += 1;
            state.check_reachable()?;
            if state.failing_names.contains(&record.name) {
                return Err(RemoteError::Api(format!("rejected '{}' (400)", record.name)));
            }
            let inserted = state.allocate(record);
            state.rows.push(inserted.clone());
            Ok(inserted)
        })
    }

    async fn insert_batch(&self, records: &[NewRemoteRecord]) -> RemoteResult<Vec<RemoteRecord>> {
        self.with_state(|state| {
            state.batch_sizes.push(records.len());
            state.check_reachable()?;
            if let Some(rejected) = records
                .iter()
                .find(|record| state.failing_names.contains(&record.name))
            {
                return Err(RemoteError::Api(format!(
                    "rejected batch containing '{}' (400)",
                    rejected.name
                )));
            }
            let inserted = records
                .iter()
                .map(|record| state.allocate(record))
                .collect::<Vec<_>>();
            state.rows.extend(inserted.iter().cloned());
            Ok(inserted)
        })
    }

    async fn select_all(&self) -> RemoteResult<Vec<RemoteRecord>> {
        self.with_state(|state| state.select_calls += 1);

        let gate = self
            .select_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.with_state(|state| {
            state.check_reachable()?;
            if state.fail_select {
                return Err(RemoteError::Api("listing failed (500)".to_string()));
            }
            let mut rows = state.rows.clone();
            rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(rows)
        })
    }

    async fn delete_by_id(&self, id: &RemoteId) -> RemoteResult<()> {
        self.with_state(|state| {
            state.delete_calls += 1;
            state.check_reachable()?;
            if state.failing_deletes.contains(id.as_str()) {
                return Err(RemoteError::Api(format!("cannot delete {id} (500)")));
            }
            state.rows.retain(|row| &row.id != id);
            Ok(())
        })
    }
}
