//! Scripted network for cache layer tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use http::{HeaderMap, StatusCode};

use super::{CacheRequest, FetchError, Fetcher, ResourceResponse};

#[derive(Default)]
pub(crate) struct FakeFetcher {
    routes: Mutex<HashMap<String, (StatusCode, Vec<u8>)>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, key: &str, body: &str) {
        self.serve_status(key, StatusCode::OK, body);
    }

    pub(crate) fn serve_status(&self, key: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (status, body.as_bytes().to_vec()));
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every fetch waits this long before answering.
    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<ResourceResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("connection refused".to_string()));
        }

        let route = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.cache_key())
            .cloned();
        let (status, body) = route.unwrap_or((StatusCode::NOT_FOUND, b"not found".to_vec()));
        Ok(ResourceResponse::from_network(status, HeaderMap::new(), body))
    }
}
