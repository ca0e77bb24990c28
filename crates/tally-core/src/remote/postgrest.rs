//! REST client for a PostgREST-style record service.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::time::Duration;
use tracing::warn;

use super::{parse_api_error, RemoteEntries, RemoteError, RemoteResult};
use crate::config::RemoteConfig;
use crate::models::{NewRemoteRecord, RemoteId, RemoteRecord};
use crate::util::is_http_url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to `<base>/rest/v1/<table>` with the service key.
#[derive(Clone)]
pub struct RestEntriesClient {
    table_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestEntriesClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestEntriesClient")
            .field("table_url", &self.table_url)
            .finish_non_exhaustive()
    }
}

impl RestEntriesClient {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let base = normalize_base_url(&config.url)?;
        let table = config.table.trim();
        if table.is_empty() || table.contains('/') {
            return Err(RemoteError::InvalidConfiguration(format!(
                "invalid table name '{table}'"
            )));
        }

        let key = config.api_key.trim();
        if key.is_empty() {
            return Err(RemoteError::InvalidConfiguration(
                "service key must not be empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            table_url: format!("{base}/rest/v1/{}", urlencoding::encode(table)),
            client,
        })
    }

    async fn post_records<T: serde::Serialize + ?Sized>(
        &self,
        body: &T,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        let response = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        response
            .json::<Vec<RemoteRecord>>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))
    }
}

impl RemoteEntries for RestEntriesClient {
    async fn insert(&self, record: &NewRemoteRecord) -> RemoteResult<RemoteRecord> {
        self.post_records(record)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RemoteError::InvalidPayload("insert returned no representation".to_string())
            })
    }

    async fn insert_batch(&self, records: &[NewRemoteRecord]) -> RemoteResult<Vec<RemoteRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = self.post_records(records).await?;
        if inserted.len() != records.len() {
            return Err(RemoteError::InvalidPayload(format!(
                "batch of {} returned {} records",
                records.len(),
                inserted.len()
            )));
        }
        Ok(inserted)
    }

    async fn select_all(&self) -> RemoteResult<Vec<RemoteRecord>> {
        let response = self
            .client
            .get(&self.table_url)
            .query(&[("select", "*"), ("order", "timestamp.desc")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        parse_listing(&body)
    }

    async fn delete_by_id(&self, id: &RemoteId) -> RemoteResult<()> {
        let response = self
            .client
            .delete(&self.table_url)
            .query(&[("id", format!("eq.{}", id.as_str()))])
            .send()
            .await?;

        // An identifier that no longer exists deletes zero rows; that is fine.
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Api(parse_api_error(status, &body)))
    }
}

/// A listing must be a JSON array; rows that do not decode as records are
/// skipped so one bad row cannot block every pull.
fn parse_listing(body: &str) -> RemoteResult<Vec<RemoteRecord>> {
    let rows: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<RemoteRecord>(row) {
            Ok(record) => records.push(record),
            Err(error) => warn!(index, %error, "Skipping undecodable remote row"),
        }
    }
    Ok(records)
}

fn normalize_base_url(raw: &str) -> RemoteResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RemoteError::InvalidConfiguration(
            "service URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(trimmed) {
        return Err(RemoteError::InvalidConfiguration(
            "service URL must include http:// or https://".to_string(),
        ));
    }
    url::Url::parse(trimmed)
        .map_err(|error| RemoteError::InvalidConfiguration(format!("invalid service URL: {error}")))?;
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn header_value(value: &str) -> RemoteResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        RemoteError::InvalidConfiguration("service key contains invalid characters".to_string())
    })
}
