//! Resource cache layer.
//!
//! Serves the application shell and its assets through two cache partitions
//! so the app keeps working when the network is slow or gone. Each GET is
//! routed by an ordered table of (predicate, strategy) pairs; when the chosen
//! strategy fails, a fallback chain ends in a synthesized offline page.

#[cfg(test)]
pub(crate) mod fake;
mod fetcher;
mod layer;
mod offline;
mod request;
mod routing;
mod storage;

pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use layer::{InstallReport, ResourceCache};
pub use offline::offline_page;
pub use request::{CacheRequest, ResourceResponse, ResponseSource};
pub use routing::{CacheManifest, Route, RoutePredicate, RouteTable, Strategy};
pub use storage::CacheStorage;
