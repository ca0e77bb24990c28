//! Connectivity probing.

use std::future::Future;
use std::time::Duration;

use super::{RemoteError, RemoteResult};
use crate::util::is_http_url;

/// Answers "can the remote service be reached right now?".
pub trait ConnectivityProbe: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

/// HEAD request against a service URL. Any HTTP answer, whatever the status,
/// means the network path works.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> RemoteResult<Self> {
        let url = url.trim();
        if !is_http_url(url) {
            return Err(RemoteError::InvalidConfiguration(
                "probe URL must include http:// or https://".to_string(),
            ));
        }
        Ok(Self {
            url: url.to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "Connectivity probe failed");
                false
            }
        }
    }
}
