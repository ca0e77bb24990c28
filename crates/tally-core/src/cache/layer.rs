//! Install, activation and request handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::{
    offline_page, CacheManifest, CacheRequest, CacheStorage, FetchError, Fetcher,
    ResourceResponse, RouteTable, Strategy,
};

/// What installation managed to cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// True when every critical resource was fetched and stored.
    pub critical_complete: bool,
    pub critical_failures: Vec<String>,
    pub optional_cached: usize,
    pub optional_failures: Vec<String>,
}

struct Inner<F> {
    manifest: CacheManifest,
    routes: RouteTable,
    origin: Url,
    storage: CacheStorage,
    fetcher: F,
    active: AtomicBool,
}

/// The cache layer. Cheap to clone; clones share partitions.
pub struct ResourceCache<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for ResourceCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher> ResourceCache<F> {
    pub fn new(manifest: CacheManifest, origin: Url, fetcher: F) -> Self {
        let routes = RouteTable::for_manifest(&manifest);
        Self::with_routes(manifest, routes, origin, fetcher)
    }

    pub fn with_routes(manifest: CacheManifest, routes: RouteTable, origin: Url, fetcher: F) -> Self {
        Self::assemble(manifest, routes, origin, fetcher, CacheStorage::new())
    }

    /// Serve from existing partitions, typically a persistent
    /// [`CacheStorage`] loaded before [`install`](Self::install).
    pub fn with_storage(
        manifest: CacheManifest,
        origin: Url,
        fetcher: F,
        storage: CacheStorage,
    ) -> Self {
        let routes = RouteTable::for_manifest(&manifest);
        Self::assemble(manifest, routes, origin, fetcher, storage)
    }

    fn assemble(
        manifest: CacheManifest,
        routes: RouteTable,
        origin: Url,
        fetcher: F,
        storage: CacheStorage,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                manifest,
                routes,
                origin,
                storage,
                fetcher,
                active: AtomicBool::new(false),
            }),
        }
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.inner.manifest
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.inner.storage
    }

    pub fn origin(&self) -> &Url {
        &self.inner.origin
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Origin URL for a path such as `/app.js?v=2`. The scheme, host and
    /// port always come from the origin, so inputs like
    /// `//other.example/x` stay on it as a path.
    pub fn resolve(&self, path_and_query: &str) -> Url {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let mut url = self.inner.origin.clone();
        url.set_path(path);
        url.set_query(query);
        url.set_fragment(None);
        url
    }

    /// Pre-cache the shell. Critical resources are stored all together or
    /// not at all; optional ones individually. Installation never fails.
    pub async fn install(&self) -> InstallReport {
        let manifest = &self.inner.manifest;
        let static_partition = manifest.static_partition();
        self.inner.storage.open(&static_partition).await;
        self.inner.storage.open(&manifest.dynamic_partition()).await;

        let mut report = InstallReport::default();
        let mut critical = Vec::with_capacity(manifest.critical.len());
        for path in &manifest.critical {
            match self.fetch_for_install(path).await {
                Ok((key, response)) => critical.push((key, response)),
                Err(error) => {
                    warn!(path = path.as_str(), %error, "Critical resource unavailable");
                    report.critical_failures.push(path.clone());
                }
            }
        }

        if report.critical_failures.is_empty() {
            self.inner.storage.put_all(&static_partition, critical).await;
            report.critical_complete = true;
        } else {
            warn!(
                failed = report.critical_failures.len(),
                "Critical set incomplete; nothing pre-cached, activating anyway"
            );
        }

        for path in &manifest.optional {
            match self.fetch_for_install(path).await {
                Ok((key, response)) => {
                    self.inner.storage.put(&static_partition, &key, &response).await;
                    report.optional_cached += 1;
                }
                Err(error) => {
                    debug!(path = path.as_str(), %error, "Optional resource skipped");
                    report.optional_failures.push(path.clone());
                }
            }
        }

        info!(
            critical_complete = report.critical_complete,
            optional_cached = report.optional_cached,
            "Cache installed"
        );
        report
    }

    async fn fetch_for_install(&self, path: &str) -> Result<(String, ResourceResponse), FetchError> {
        let request = CacheRequest::get(self.resolve(path));
        let response = self.inner.fetcher.fetch(&request).await?;
        if !response.is_cacheable() {
            return Err(FetchError::Status(response.status));
        }
        Ok((request.cache_key(), response))
    }

    /// Drop partitions from other versions and start serving requests.
    /// Returns the names of the deleted partitions.
    pub async fn activate(&self) -> Vec<String> {
        let keep = [
            self.inner.manifest.static_partition(),
            self.inner.manifest.dynamic_partition(),
        ];
        let mut deleted = Vec::new();
        for name in self.inner.storage.names().await {
            if !keep.contains(&name) && self.inner.storage.delete(&name).await {
                deleted.push(name);
            }
        }
        self.inner.active.store(true, Ordering::SeqCst);
        info!(?deleted, "Cache activated");
        deleted
    }

    /// Same-origin GET requests over http(s) are handled by the cache
    /// layer; anything else passes straight through. Entries are keyed by
    /// path, so other origins must never reach the partitions.
    pub fn intercepts(&self, request: &CacheRequest) -> bool {
        request.method == http::Method::GET
            && request.is_network_scheme()
            && request.url.origin() == self.inner.origin.origin()
    }

    /// Serve a request. Intercepted requests always get a response, at worst
    /// the offline page; pass-through requests surface network errors.
    pub async fn handle(&self, request: &CacheRequest) -> Result<ResourceResponse, FetchError> {
        if !self.intercepts(request) || !self.is_active() {
            return self.inner.fetcher.fetch(request).await;
        }

        let strategy = self.inner.routes.select(&self.inner.manifest, request);
        debug!(path = request.path(), ?strategy, "Routing request");

        let result = match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        };

        match result {
            Ok(response) => Ok(response),
            Err(error) => {
                debug!(path = request.path(), %error, "Strategy failed; using fallback");
                Ok(self.fallback(request).await)
            }
        }
    }

    async fn cache_first(&self, request: &CacheRequest) -> Result<ResourceResponse, FetchError> {
        let key = request.cache_key();
        if let Some(hit) = self.inner.storage.match_any(&key).await {
            return Ok(hit);
        }

        let response = self.inner.fetcher.fetch(request).await?;
        if response.is_cacheable() {
            self.inner
                .storage
                .put(&self.inner.manifest.static_partition(), &key, &response)
                .await;
        }
        Ok(response)
    }

    async fn network_first(&self, request: &CacheRequest) -> Result<ResourceResponse, FetchError> {
        let key = request.cache_key();
        let timeout = self.inner.manifest.network_timeout;

        let error = match tokio::time::timeout(timeout, self.inner.fetcher.fetch(request)).await {
            Ok(Ok(response)) => {
                if response.is_cacheable() {
                    self.inner
                        .storage
                        .put(&self.inner.manifest.dynamic_partition(), &key, &response)
                        .await;
                }
                return Ok(response);
            }
            Ok(Err(error)) => error,
            Err(_) => FetchError::Timeout(timeout),
        };

        self.inner.storage.match_any(&key).await.ok_or(error)
    }

    async fn stale_while_revalidate(
        &self,
        request: &CacheRequest,
    ) -> Result<ResourceResponse, FetchError> {
        let key = request.cache_key();
        if let Some(hit) = self.inner.storage.match_any(&key).await {
            let inner = Arc::clone(&self.inner);
            let request = request.clone();
            tokio::spawn(async move {
                inner.revalidate(&request, &key).await;
            });
            return Ok(hit);
        }

        let response = self.inner.fetcher.fetch(request).await?;
        if response.is_cacheable() {
            self.inner
                .storage
                .put(&self.inner.manifest.dynamic_partition(), &key, &response)
                .await;
        }
        Ok(response)
    }

    /// Exact match, then the shell root for navigations, then the offline page.
    async fn fallback(&self, request: &CacheRequest) -> ResourceResponse {
        if let Some(hit) = self.inner.storage.match_any(&request.cache_key()).await {
            return hit;
        }
        if request.navigate {
            if let Some(shell) = self.inner.storage.match_any(&self.inner.manifest.shell_root).await {
                return shell;
            }
        }
        offline_page()
    }
}

impl<F: Fetcher> Inner<F> {
    async fn revalidate(&self, request: &CacheRequest, key: &str) {
        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_cacheable() => {
                self.storage
                    .put(&self.manifest.dynamic_partition(), key, &response)
                    .await;
                debug!(key, "Revalidated cached resource");
            }
            Ok(response) => debug!(key, status = %response.status, "Revalidation not cached"),
            Err(error) => debug!(key, %error, "Revalidation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::StatusCode;

    use super::*;
    use crate::cache::fake::FakeFetcher;
    use crate::cache::ResponseSource;
    use pretty_assertions::assert_eq;

    const ORIGIN: &str = "https://app.example";

    fn manifest() -> CacheManifest {
        CacheManifest {
            version: "v2".to_string(),
            critical: vec!["/".to_string(), "/app.js".to_string()],
            optional: vec!["/locales/hi.json".to_string(), "/missing.png".to_string()],
            data_prefixes: vec!["/rest/v1/".to_string()],
            network_timeout: Duration::from_millis(3000),
            shell_root: "/".to_string(),
        }
    }

    fn fetcher() -> FakeFetcher {
        let fetcher = FakeFetcher::new();
        fetcher.serve("/", "<html>shell</html>");
        fetcher.serve("/app.js", "console.log('v2')");
        fetcher.serve("/locales/hi.json", "{\"hello\":\"नमस्ते\"}");
        fetcher
    }

    async fn installed(fetcher: FakeFetcher) -> ResourceCache<FakeFetcher> {
        let cache = ResourceCache::new(manifest(), Url::parse(ORIGIN).unwrap(), fetcher);
        cache.install().await;
        cache.activate().await;
        cache
    }

    fn get(cache: &ResourceCache<FakeFetcher>, path: &str) -> CacheRequest {
        CacheRequest::get(cache.resolve(path))
    }

    #[tokio::test]
    async fn install_caches_critical_and_tolerates_optional_failures() {
        let cache = ResourceCache::new(manifest(), Url::parse(ORIGIN).unwrap(), fetcher());
        let report = cache.install().await;

        assert!(report.critical_complete);
        assert_eq!(report.optional_cached, 1);
        assert_eq!(report.optional_failures, vec!["/missing.png".to_string()]);
        assert!(cache.storage().match_in("tally-static-v2", "/app.js").await.is_some());
    }

    #[tokio::test]
    async fn install_stores_no_critical_resource_when_one_fails() {
        let fetcher = fetcher();
        fetcher.serve_status("/app.js", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        let cache = ResourceCache::new(manifest(), Url::parse(ORIGIN).unwrap(), fetcher);

        let report = cache.install().await;
        assert!(!report.critical_complete);
        assert_eq!(report.critical_failures, vec!["/app.js".to_string()]);
        assert!(cache.storage().match_any("/").await.is_none());

        cache.activate().await;
        assert!(cache.is_active());
    }

    #[tokio::test]
    async fn activate_removes_partitions_from_other_versions() {
        let cache = ResourceCache::new(manifest(), Url::parse(ORIGIN).unwrap(), fetcher());
        cache.storage().open("tally-static-v1").await;
        cache.storage().open("tally-dynamic-v1").await;
        cache.install().await;

        let mut deleted = cache.activate().await;
        deleted.sort();
        assert_eq!(deleted, vec!["tally-dynamic-v1", "tally-static-v1"]);
        assert_eq!(
            cache.storage().names().await,
            vec!["tally-dynamic-v2", "tally-static-v2"]
        );
    }

    #[tokio::test]
    async fn cache_first_hit_never_touches_network() {
        let cache = installed(fetcher()).await;
        let calls = cache.inner.fetcher.calls();
        cache.inner.fetcher.serve("/app.js", "console.log('v3')");

        let response = cache.handle(&get(&cache, "/app.js")).await.unwrap();

        assert_eq!(response.body, b"console.log('v2')");
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(cache.inner.fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn cache_first_miss_fetches_and_stores_in_static_partition() {
        let fetcher = fetcher();
        fetcher.serve_status("/app.js", StatusCode::SERVICE_UNAVAILABLE, "down");
        let cache = installed(fetcher).await;
        cache.inner.fetcher.serve("/app.js", "late");

        let response = cache.handle(&get(&cache, "/app.js")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(
            cache.storage().match_in("tally-static-v2", "/app.js").await.unwrap().body,
            b"late"
        );
    }

    #[tokio::test]
    async fn network_first_stores_fresh_data_and_falls_back_when_offline() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.serve("/rest/v1/entries", "[1]");

        let fresh = cache.handle(&get(&cache, "/rest/v1/entries")).await.unwrap();
        assert_eq!(fresh.source, ResponseSource::Network);

        cache.inner.fetcher.set_offline(true);
        let stale = cache.handle(&get(&cache, "/rest/v1/entries")).await.unwrap();
        assert_eq!(stale.source, ResponseSource::Cache);
        assert_eq!(stale.body, b"[1]");
    }

    #[tokio::test(start_paused = true)]
    async fn network_first_times_out_to_cached_copy() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.serve("/rest/v1/entries", "[1]");
        cache.handle(&get(&cache, "/rest/v1/entries")).await.unwrap();

        cache.inner.fetcher.set_delay(Some(Duration::from_secs(10)));
        let started = tokio::time::Instant::now();
        let response = cache.handle(&get(&cache, "/rest/v1/entries")).await.unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn stale_while_revalidate_answers_from_cache_while_offline() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.set_offline(true);

        let response = tokio::time::timeout(
            Duration::from_millis(100),
            cache.handle(&get(&cache, "/locales/hi.json")),
        )
        .await
        .expect("cached answer must not wait for the network")
        .unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, "{\"hello\":\"नमस्ते\"}".as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_while_revalidate_does_not_await_slow_network() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.set_delay(Some(Duration::from_secs(30)));
        let started = tokio::time::Instant::now();

        let response = cache.handle(&get(&cache, "/locales/hi.json")).await.unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn stale_while_revalidate_refreshes_in_background() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.serve("/locales/hi.json", "{\"v\":2}");

        let first = cache.handle(&get(&cache, "/locales/hi.json")).await.unwrap();
        assert_ne!(first.body, b"{\"v\":2}");

        let dynamic = cache.manifest().dynamic_partition();
        for _ in 0..50 {
            if cache.storage().match_in(&dynamic, "/locales/hi.json").await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            cache.storage().match_in(&dynamic, "/locales/hi.json").await.unwrap().body,
            b"{\"v\":2}"
        );
    }

    #[tokio::test]
    async fn stale_while_revalidate_miss_awaits_network() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.serve("/about", "about page");

        let response = cache.handle(&get(&cache, "/about")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert!(cache
            .storage()
            .match_in(&cache.manifest().dynamic_partition(), "/about")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn navigation_falls_back_to_shell_then_offline_page() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.set_offline(true);

        let navigation = CacheRequest::navigation(cache.resolve("/entries/42"));
        let shell = cache.handle(&navigation).await.unwrap();
        assert_eq!(shell.body, b"<html>shell</html>");

        let asset = cache.handle(&get(&cache, "/img/photo.png")).await.unwrap();
        assert_eq!(asset.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(asset.source, ResponseSource::Offline);
    }

    #[tokio::test]
    async fn non_get_requests_pass_through() {
        let cache = installed(fetcher()).await;
        let calls = cache.inner.fetcher.calls();
        let mut post = get(&cache, "/app.js");
        post.method = http::Method::POST;

        assert!(!cache.intercepts(&post));
        let response = cache.handle(&post).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(cache.inner.fetcher.calls(), calls + 1);

        cache.inner.fetcher.set_offline(true);
        assert!(cache.handle(&post).await.is_err());
    }

    #[tokio::test]
    async fn requests_before_activation_go_to_network() {
        let cache = ResourceCache::new(manifest(), Url::parse(ORIGIN).unwrap(), fetcher());
        cache.install().await;

        let response = cache.handle(&get(&cache, "/app.js")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[test]
    fn resolve_keeps_paths_on_the_origin() {
        let cache = ResourceCache::new(manifest(), Url::parse(ORIGIN).unwrap(), fetcher());

        let url = cache.resolve("//evil.example/about");
        assert_eq!(url.host_str(), Some("app.example"));
        assert_eq!(url.path(), "//evil.example/about");

        let url = cache.resolve("/rest/v1/entries?order=timestamp.desc");
        assert_eq!(
            url.as_str(),
            "https://app.example/rest/v1/entries?order=timestamp.desc"
        );
    }

    #[tokio::test]
    async fn cross_origin_requests_are_never_cached() {
        let cache = installed(fetcher()).await;
        cache.inner.fetcher.serve("/about", "someone else's page");
        let foreign = CacheRequest::get(Url::parse("https://evil.example/about").unwrap());

        assert!(!cache.intercepts(&foreign));
        let response = cache.handle(&foreign).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert!(cache.storage().match_any("/about").await.is_none());

        cache.inner.fetcher.set_offline(true);
        assert!(cache.handle(&foreign).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn activate_removes_old_versions_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let old = CacheStorage::open_persistent(&path).await.unwrap();
            let stale = ResourceResponse::from_network(
                StatusCode::OK,
                http::HeaderMap::new(),
                b"console.log('v1')".to_vec(),
            );
            old.put("tally-static-v1", "/app.js", &stale).await;
            old.open("tally-dynamic-v1").await;
        }

        let storage = CacheStorage::open_persistent(&path).await.unwrap();
        let cache =
            ResourceCache::with_storage(manifest(), Url::parse(ORIGIN).unwrap(), fetcher(), storage);
        cache.install().await;
        let mut deleted = cache.activate().await;
        deleted.sort();
        assert_eq!(deleted, vec!["tally-dynamic-v1", "tally-static-v1"]);
        drop(cache);

        let reopened = CacheStorage::open_persistent(&path).await.unwrap();
        assert_eq!(
            reopened.names().await,
            vec!["tally-dynamic-v2", "tally-static-v2"]
        );
        assert_eq!(
            reopened.match_any("/app.js").await.unwrap().body,
            b"console.log('v2')"
        );
    }
}
