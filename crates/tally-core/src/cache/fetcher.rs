//! Network access for the cache layer.

use std::future::Future;
use std::time::Duration;

use http::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use http::StatusCode;
use thiserror::Error;

use super::{CacheRequest, ResourceResponse};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(String),
    #[error("Network request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unexpected HTTP status {0}")]
    Status(StatusCode),
}

/// Performs a request against the network. Any HTTP answer is `Ok`; only
/// transport failures are errors.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &CacheRequest,
    ) -> impl Future<Output = Result<ResourceResponse, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|error| FetchError::Network(error.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<ResourceResponse, FetchError> {
        let mut headers = request.headers.clone();
        for name in [HOST, CONNECTION, TRANSFER_ENCODING] {
            headers.remove(name);
        }

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|error| FetchError::Network(error.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::Network(error.to_string()))?;

        Ok(ResourceResponse::from_network(status, headers, body.to_vec()))
    }
}
