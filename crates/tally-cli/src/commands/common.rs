use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tally_core::config::EngineConfig;
use tally_core::network::{Connectivity, NetworkObserver};
use tally_core::remote::{ConnectivityProbe, HttpProbe, RestEntriesClient};
use tally_core::services::{EntryService, EntryStore};
use tally_core::sync::{EntryView, SyncEngine, SyncSettings};
use tally_core::{LocalId, LocalRecord, Location};

use crate::error::CliError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub type Service = EntryService<RestEntriesClient>;

/// The opened store plus, when a remote is configured, the probe that feeds
/// the network observer.
pub struct Session {
    pub service: Service,
    pub probe: Option<HttpProbe>,
}

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub local_id: i64,
    pub remote_id: Option<String>,
    pub name: String,
    pub language: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub timestamp: String,
    pub relative_time: String,
    pub pending: bool,
}

pub async fn open_session(db_path: &Path, config: &EngineConfig) -> Result<Session, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = EntryStore::open_path(db_path).await?;

    let Some(remote_config) = config.remote.as_ref() else {
        tracing::debug!("No remote configured; running local-only");
        let service = EntryService::local(store);
        service.load().await?;
        return Ok(Session {
            service,
            probe: None,
        });
    };

    let remote = RestEntriesClient::new(remote_config)?;
    let probe = HttpProbe::new(&remote_config.url, PROBE_TIMEOUT)?;
    let network = NetworkObserver::new(Connectivity::from(probe.check().await));

    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote),
        network,
        EntryView::new(),
        SyncSettings::from(config),
    );
    let service = EntryService::with_engine(store, engine);
    service.load().await?;

    Ok(Session {
        service,
        probe: Some(probe),
    })
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &EngineConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

pub fn normalize_name(parts: &[String]) -> Result<String, CliError> {
    let name = parts.join(" ");
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyName);
    }
    Ok(trimmed.to_string())
}

pub fn parse_local_id(id: &str) -> Result<LocalId, CliError> {
    id.trim()
        .parse::<LocalId>()
        .map_err(|_| CliError::InvalidId(id.to_string()))
}

/// Latitude and longitude come together; accuracy defaults to zero.
pub fn parse_location(
    lat: Option<f64>,
    lon: Option<f64>,
    accuracy: Option<f64>,
) -> Result<Option<Location>, CliError> {
    match (lat, lon) {
        (None, None) if accuracy.is_none() => Ok(None),
        (Some(latitude), Some(longitude)) => {
            Location::new(latitude, longitude, accuracy.unwrap_or(0.0))
                .map(Some)
                .map_err(|error| CliError::InvalidLocation(error.to_string()))
        }
        _ => Err(CliError::InvalidLocation(
            "--lat and --lon must be given together".to_string(),
        )),
    }
}

pub fn entry_to_list_item(entry: &LocalRecord, now_ms: i64) -> EntryListItem {
    EntryListItem {
        local_id: entry.local_id.get(),
        remote_id: entry.remote_id.as_ref().map(ToString::to_string),
        name: entry.name.clone(),
        language: entry.language.as_str().to_string(),
        latitude: entry.location.map(|location| location.latitude),
        longitude: entry.location.map(|location| location.longitude),
        accuracy: entry.location.map(|location| location.accuracy),
        timestamp: entry.timestamp.to_rfc3339(),
        relative_time: format_relative_time(entry.timestamp.timestamp_millis(), now_ms),
        pending: entry.is_pending(),
    }
}

pub fn format_entry_lines(entries: &[LocalRecord], now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let relative_time = format_relative_time(entry.timestamp.timestamp_millis(), now_ms);
            let marker = if entry.is_pending() { "  [pending]" } else { "" };
            format!(
                "{:>6}  {}  ({}, {relative_time}){marker}",
                entry.local_id.get(),
                entry.name,
                entry.language
            )
        })
        .collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff_seconds = now_ms.saturating_sub(timestamp_ms).max(0) / 1000;
    if diff_seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff_seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }

    format!("{}d ago", hours / 24)
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
