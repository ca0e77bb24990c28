use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tally_core::cache::{CacheRequest, Fetcher, ResourceCache, ResourceResponse};
use tower_http::trace::TraceLayer;

use crate::error::ShellError;

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const SEC_FETCH_MODE: &str = "sec-fetch-mode";
const CACHE_SOURCE: &str = "x-tally-cache";

pub struct ShellState<F> {
    cache: ResourceCache<F>,
}

impl<F> Clone for ShellState<F> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<F: Fetcher> ShellState<F> {
    pub const fn new(cache: ResourceCache<F>) -> Self {
        Self { cache }
    }
}

pub fn app_router<F: Fetcher>(state: ShellState<F>) -> Router {
    Router::new()
        .route("/__tally/health", get(health::<F>))
        .fallback(serve::<F>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct PartitionSummary {
    name: String,
    entries: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    active: bool,
    version: String,
    partitions: Vec<PartitionSummary>,
}

async fn health<F: Fetcher>(State(state): State<ShellState<F>>) -> Json<HealthResponse> {
    let partitions = state
        .cache
        .storage()
        .summary()
        .await
        .into_iter()
        .map(|(name, entries)| PartitionSummary { name, entries })
        .collect();

    Json(HealthResponse {
        status: "ok",
        active: state.cache.is_active(),
        version: state.cache.manifest().version.clone(),
        partitions,
    })
}

/// Every other request goes through the cache layer toward the origin.
async fn serve<F: Fetcher>(
    State(state): State<ShellState<F>>,
    request: Request,
) -> Result<Response, ShellError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|error| ShellError::bad_request(format!("unreadable body: {error}")))?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |value| value.as_str());
    let cache_request = CacheRequest {
        navigate: is_navigation(&parts.method, &parts.headers),
        method: parts.method,
        url: state.cache.resolve(path_and_query),
        headers: parts.headers,
        body: body.to_vec(),
    };

    let resource = state.cache.handle(&cache_request).await?;
    Ok(into_http_response(resource))
}

/// Full-page loads: browsers say so via `Sec-Fetch-Mode`; otherwise an HTML
/// `Accept` on a GET is taken as one.
pub fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if *method != Method::GET {
        return false;
    }
    if let Some(mode) = headers.get(SEC_FETCH_MODE) {
        return mode.as_bytes().eq_ignore_ascii_case(b"navigate");
    }
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn into_http_response(resource: ResourceResponse) -> Response {
    let mut headers = resource.headers;
    for name in [CONNECTION, TRANSFER_ENCODING, CONTENT_LENGTH] {
        headers.remove(name);
    }
    headers.insert(
        HeaderName::from_static(CACHE_SOURCE),
        HeaderValue::from_static(resource.source.as_str()),
    );

    (resource.status, headers, Body::from(resource.body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use tally_core::cache::{CacheManifest, FetchError};
    use url::Url;

    use super::*;

    #[derive(Default)]
    struct Origin {
        pages: HashMap<String, &'static str>,
        offline: AtomicBool,
        calls: AtomicUsize,
        seen: Mutex<Vec<Url>>,
    }

    #[derive(Clone, Default)]
    struct OriginFetcher(Arc<Origin>);

    impl Fetcher for OriginFetcher {
        async fn fetch(&self, request: &CacheRequest) -> Result<ResourceResponse, FetchError> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            self.0.seen.lock().unwrap().push(request.url.clone());
            if self.0.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Network("connection refused".to_string()));
            }
            let (status, body) = self
                .0
                .pages
                .get(&request.cache_key())
                .map_or((StatusCode::NOT_FOUND, "missing"), |body| {
                    (StatusCode::OK, *body)
                });
            Ok(ResourceResponse::from_network(
                status,
                HeaderMap::new(),
                body.as_bytes().to_vec(),
            ))
        }
    }

    fn origin() -> OriginFetcher {
        let mut pages = HashMap::new();
        pages.insert("/".to_string(), "<html>shell</html>");
        pages.insert("/app.js".to_string(), "app();");
        OriginFetcher(Arc::new(Origin {
            pages,
            ..Origin::default()
        }))
    }

    async fn state(fetcher: OriginFetcher) -> ShellState<OriginFetcher> {
        let manifest = CacheManifest {
            critical: vec!["/".to_string(), "/app.js".to_string()],
            optional: Vec::new(),
            ..CacheManifest::default()
        };
        let cache = ResourceCache::new(
            manifest,
            Url::parse("https://app.example").unwrap(),
            fetcher,
        );
        cache.install().await;
        cache.activate().await;
        ShellState::new(cache)
    }

    fn request(method: Method, uri: &str, headers: &[(&'static str, &'static str)]) -> Request {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn navigation_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_navigation(&Method::GET, &headers));

        headers.insert(ACCEPT, HeaderValue::from_static("text/html,*/*"));
        assert!(is_navigation(&Method::GET, &headers));
        assert!(!is_navigation(&Method::POST, &headers));

        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("cors"));
        assert!(!is_navigation(&Method::GET, &headers));

        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("navigate"));
        assert!(is_navigation(&Method::GET, &headers));
    }

    #[tokio::test]
    async fn critical_asset_is_served_from_cache() {
        let fetcher = origin();
        let state = state(fetcher.clone()).await;
        let calls = fetcher.0.calls.load(Ordering::SeqCst);

        let response = serve(State(state), request(Method::GET, "/app.js", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CACHE_SOURCE], "cache");
        assert_eq!(body_text(response).await, "app();");
        assert_eq!(fetcher.0.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn offline_navigation_gets_the_shell() {
        let fetcher = origin();
        let state = state(fetcher.clone()).await;
        fetcher.0.offline.store(true, Ordering::SeqCst);

        let response = serve(
            State(state),
            request(Method::GET, "/entries?page=2", &[("sec-fetch-mode", "navigate")]),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<html>shell</html>");
    }

    #[tokio::test]
    async fn offline_asset_gets_offline_page() {
        let fetcher = origin();
        let state = state(fetcher.clone()).await;
        fetcher.0.offline.store(true, Ordering::SeqCst);

        let response = serve(State(state), request(Method::GET, "/img/logo.png", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[CACHE_SOURCE], "offline");
    }

    #[tokio::test]
    async fn failed_pass_through_becomes_bad_gateway() {
        let fetcher = origin();
        let state = state(fetcher.clone()).await;
        fetcher.0.offline.store(true, Ordering::SeqCst);

        let error = serve(State(state), request(Method::POST, "/rest/v1/entries", &[]))
            .await
            .unwrap_err();

        assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn scheme_relative_paths_stay_on_the_origin() {
        let fetcher = origin();
        let state = state(fetcher.clone()).await;

        let response = serve(
            State(state.clone()),
            request(Method::GET, "//evil.example/about", &[]),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let seen = fetcher.0.seen.lock().unwrap().clone();
        assert!(seen.iter().all(|url| url.host_str() == Some("app.example")));
        assert_eq!(
            seen.last().map(Url::as_str),
            Some("https://app.example//evil.example/about")
        );
        assert!(state.cache.storage().match_any("/about").await.is_none());
    }

    #[tokio::test]
    async fn health_lists_partitions() {
        let state = state(origin()).await;

        let Json(health) = health(State(state)).await;
        let value = serde_json::to_value(&health).unwrap();

        assert_eq!(value["status"], "ok");
        assert_eq!(value["active"], true);
        assert_eq!(value["partitions"][0]["name"], "tally-dynamic-v1");
        assert_eq!(value["partitions"][1]["name"], "tally-static-v1");
        assert_eq!(value["partitions"][1]["entries"], 2);
    }
}
