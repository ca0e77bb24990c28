//! Remote record service client.
//!
//! The service holds the canonical copy of every entry. It offers single and
//! bulk insert, a full listing ordered newest first, and physical delete by
//! identifier. It has no notion of tombstones.

mod chunked;
#[cfg(test)]
pub(crate) mod fake;
mod postgrest;
mod probe;

use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{NewRemoteRecord, RemoteId, RemoteRecord};

pub use chunked::{insert_chunked, ChunkFailure, ChunkedInsertReport, DEFAULT_CHUNK_SIZE};
pub use postgrest::RestEntriesClient;
pub use probe::{ConnectivityProbe, HttpProbe};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote service configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote service HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Remote service API error: {0}")]
    Api(String),
    #[error("Invalid remote service payload: {0}")]
    InvalidPayload(String),
    #[error("Remote service unreachable: {0}")]
    Unreachable(String),
}

impl RemoteError {
    /// Connectivity failures, as opposed to the service rejecting a request.
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::Unreachable(error.to_string())
        } else {
            Self::Http(error)
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations the synchronization engine needs from the remote service.
///
/// Implementations must be shareable across tasks: the engine is driven both by
/// direct user actions and by the background trigger.
pub trait RemoteEntries: Send + Sync + 'static {
    /// Insert one record and return the service's canonical copy.
    fn insert(
        &self,
        record: &NewRemoteRecord,
    ) -> impl Future<Output = RemoteResult<RemoteRecord>> + Send;

    /// Insert a batch in a single request. The batch is accepted or rejected
    /// as a whole.
    fn insert_batch(
        &self,
        records: &[NewRemoteRecord],
    ) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send;

    /// Every remote record, ordered by timestamp descending.
    fn select_all(&self) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send;

    /// Delete by identifier. Deleting an identifier the service no longer
    /// holds is a success.
    fn delete_by_id(&self, id: &RemoteId) -> impl Future<Output = RemoteResult<()>> + Send;
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ServiceErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            let detail = payload.details.or(payload.hint);
            return match detail {
                Some(detail) if !detail.trim().is_empty() => {
                    format!("{}: {} ({})", message.trim(), detail.trim(), status.as_u16())
                }
                _ => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_error_prefers_service_message() {
        let body = r#"{"code":"23502","message":"null value in column \"name\"","details":"Failing row contains (...)"}"#;
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, body),
            "null value in column \"name\": Failing row contains (...) (400)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_raw_body() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::NOT_FOUND, "  "), "HTTP 404");
    }

    #[test]
    fn only_connectivity_failures_are_unreachable() {
        assert!(RemoteError::Unreachable("connection refused".to_string()).is_unreachable());
        assert!(!RemoteError::Api("rejected (400)".to_string()).is_unreachable());
        assert!(!RemoteError::InvalidPayload("not an array".to_string()).is_unreachable());
    }
}
