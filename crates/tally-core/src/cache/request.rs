use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// A request as seen by the cache layer. URLs are absolute and point at the
/// origin.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Full-page navigation rather than a subresource fetch.
    pub navigate: bool,
}

impl CacheRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
            navigate: false,
        }
    }

    pub fn navigation(url: Url) -> Self {
        Self {
            navigate: true,
            ..Self::get(url)
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Path plus query; the key entries are stored under.
    pub fn cache_key(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }

    pub fn is_network_scheme(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Offline,
}

impl ResponseSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl ResourceResponse {
    pub fn from_network(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            source: ResponseSource::Network,
        }
    }

    /// Only successful responses are worth caching.
    pub fn is_cacheable(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_keeps_query() {
        let request = CacheRequest::get(Url::parse("https://app.example/rest/v1/entries?order=timestamp.desc").unwrap());
        assert_eq!(request.cache_key(), "/rest/v1/entries?order=timestamp.desc");
        assert_eq!(request.path(), "/rest/v1/entries");
        assert!(request.is_network_scheme());
    }

    #[test]
    fn non_network_schemes_are_detected() {
        let request = CacheRequest::get(Url::parse("data:text/plain,hello").unwrap());
        assert!(!request.is_network_scheme());
    }
}
