//! Strategy selection.

use std::time::Duration;

use super::CacheRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    /// Race the network against the manifest's timeout, then fall back to
    /// the cache.
    NetworkFirst,
    StaleWhileRevalidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePredicate {
    /// Path is on the manifest's critical list.
    CriticalResource,
    PathPrefix(String),
    Always,
}

impl RoutePredicate {
    fn matches(&self, manifest: &CacheManifest, request: &CacheRequest) -> bool {
        match self {
            Self::CriticalResource => manifest.is_critical(request.path()),
            Self::PathPrefix(prefix) => request.path().starts_with(prefix.as_str()),
            Self::Always => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub predicate: RoutePredicate,
    pub strategy: Strategy,
}

/// Routes evaluated in order; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub const fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Critical paths cache-first, data endpoints network-first, everything
    /// else stale-while-revalidate.
    pub fn for_manifest(manifest: &CacheManifest) -> Self {
        let mut routes = vec![Route {
            predicate: RoutePredicate::CriticalResource,
            strategy: Strategy::CacheFirst,
        }];
        routes.extend(manifest.data_prefixes.iter().map(|prefix| Route {
            predicate: RoutePredicate::PathPrefix(prefix.clone()),
            strategy: Strategy::NetworkFirst,
        }));
        routes.push(Route {
            predicate: RoutePredicate::Always,
            strategy: Strategy::StaleWhileRevalidate,
        });
        Self { routes }
    }

    /// Strategy of the first matching route. A table without a catch-all
    /// falls back to stale-while-revalidate.
    pub fn select(&self, manifest: &CacheManifest, request: &CacheRequest) -> Strategy {
        self.routes
            .iter()
            .find(|route| route.predicate.matches(manifest, request))
            .map_or(Strategy::StaleWhileRevalidate, |route| route.strategy)
    }
}

/// What to cache and how partitions are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheManifest {
    /// Bumping the version retires every partition of older versions on
    /// activation.
    pub version: String,
    pub critical: Vec<String>,
    pub optional: Vec<String>,
    pub data_prefixes: Vec<String>,
    pub network_timeout: Duration,
    /// Served for navigations when nothing else matches.
    pub shell_root: String,
}

pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_millis(3000);

impl Default for CacheManifest {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            critical: [
                "/",
                "/index.html",
                "/manifest.json",
                "/styles.css",
                "/app.js",
            ]
            .map(String::from)
            .to_vec(),
            optional: [
                "/icons/icon-192.png",
                "/icons/icon-512.png",
                "/locales/en.json",
                "/locales/hi.json",
            ]
            .map(String::from)
            .to_vec(),
            data_prefixes: vec!["/rest/v1/".to_string()],
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            shell_root: "/".to_string(),
        }
    }
}

impl CacheManifest {
    pub fn static_partition(&self) -> String {
        format!("tally-static-{}", self.version)
    }

    pub fn dynamic_partition(&self) -> String {
        format!("tally-dynamic-{}", self.version)
    }

    pub fn is_critical(&self, path: &str) -> bool {
        self.critical.iter().any(|critical| critical == path)
    }
}
