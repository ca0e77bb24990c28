//! Engine configuration.
//!
//! Values come from the process environment (binaries load `.env` first).
//! Parsing goes through [`EngineConfig::from_lookup`] so tests never touch
//! the real environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_REMOTE_TABLE: &str = "entries";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection details for the remote record service.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `None` runs local-only: entries stay pending until a remote is configured.
    pub remote: Option<RemoteConfig>,
    pub db_path: Option<PathBuf>,
    /// Pause between sequential pushes within one cycle.
    pub push_delay: Duration,
    /// Minimum spacing between reconnect-triggered cycles.
    pub reconnect_cooldown: Duration,
    pub sync_interval: Duration,
    pub probe_interval: Duration,
    /// 0 retries tombstone deletes forever.
    pub tombstone_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote: None,
            db_path: None,
            push_delay: Duration::from_millis(100),
            reconnect_cooldown: Duration::from_secs(5),
            sync_interval: Duration::from_secs(60),
            probe_interval: Duration::from_secs(10),
            tombstone_max_attempts: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let remote = parse_remote_config(&lookup)?;
        let db_path = optional_trimmed(&lookup, "TALLY_DB_PATH").map(PathBuf::from);

        let push_delay_ms = parse_number(&lookup, "TALLY_PUSH_DELAY_MS", 100, 0..=10_000)?;
        let reconnect_cooldown_secs =
            parse_number(&lookup, "TALLY_RECONNECT_COOLDOWN_SECS", 5, 0..=3_600)?;
        let sync_interval_secs = parse_number(&lookup, "TALLY_SYNC_INTERVAL_SECS", 60, 1..=86_400)?;
        let probe_interval_secs =
            parse_number(&lookup, "TALLY_PROBE_INTERVAL_SECS", 10, 1..=3_600)?;
        let tombstone_max_attempts =
            parse_number(&lookup, "TALLY_TOMBSTONE_MAX_ATTEMPTS", 0, 0..=10_000)?;

        Ok(Self {
            remote,
            db_path,
            push_delay: Duration::from_millis(push_delay_ms),
            reconnect_cooldown: Duration::from_secs(reconnect_cooldown_secs),
            sync_interval: Duration::from_secs(sync_interval_secs),
            probe_interval: Duration::from_secs(probe_interval_secs),
            tombstone_max_attempts: u32::try_from(tombstone_max_attempts).unwrap_or(u32::MAX),
        })
    }
}

fn parse_remote_config(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<RemoteConfig>, ConfigError> {
    let url = optional_trimmed(&lookup, "TALLY_REMOTE_URL");
    let api_key = optional_trimmed(&lookup, "TALLY_REMOTE_KEY");

    if url.is_none() && api_key.is_none() {
        return Ok(None);
    }

    let url = url.ok_or(ConfigError::MissingVar("TALLY_REMOTE_URL"))?;
    let api_key = api_key.ok_or(ConfigError::MissingVar("TALLY_REMOTE_KEY"))?;
    if !is_http_url(&url) {
        return Err(ConfigError::Invalid(
            "TALLY_REMOTE_URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(Some(RemoteConfig {
        url: url.trim_end_matches('/').to_string(),
        api_key,
        table: value_or_default(&lookup, "TALLY_REMOTE_TABLE", DEFAULT_REMOTE_TABLE),
    }))
}

fn parse_number(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = raw.parse::<u64>().map_err(|_| invalid())?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        EngineConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_is_local_only_with_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.remote.is_none());
    }

    #[test]
    fn remote_url_and_key_must_come_together() {
        let err = parse(&[("TALLY_REMOTE_URL", "https://project.example.co")]).unwrap_err();
        assert!(err.to_string().contains("TALLY_REMOTE_KEY"));

        let err = parse(&[("TALLY_REMOTE_KEY", "key")]).unwrap_err();
        assert!(err.to_string().contains("TALLY_REMOTE_URL"));
    }

    #[test]
    fn parses_remote_and_tuning_values() {
        let config = parse(&[
            ("TALLY_REMOTE_URL", "https://project.example.co/"),
            ("TALLY_REMOTE_KEY", " service-key "),
            ("TALLY_REMOTE_TABLE", "people"),
            ("TALLY_PUSH_DELAY_MS", "0"),
            ("TALLY_RECONNECT_COOLDOWN_SECS", "3"),
            ("TALLY_TOMBSTONE_MAX_ATTEMPTS", "5"),
            ("TALLY_DB_PATH", "/tmp/tally.db"),
        ])
        .unwrap();

        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "https://project.example.co");
        assert_eq!(remote.api_key, "service-key");
        assert_eq!(remote.table, "people");
        assert_eq!(config.push_delay, Duration::ZERO);
        assert_eq!(config.reconnect_cooldown, Duration::from_secs(3));
        assert_eq!(config.tombstone_max_attempts, 5);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/tally.db")));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let err = parse(&[("TALLY_SYNC_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("TALLY_SYNC_INTERVAL_SECS"));
        assert!(parse(&[("TALLY_PUSH_DELAY_MS", "soon")]).is_err());
    }

    #[test]
    fn remote_config_redacts_key() {
        let config = parse(&[
            ("TALLY_REMOTE_URL", "https://project.example.co"),
            ("TALLY_REMOTE_KEY", "sensitive-service-key"),
        ])
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-service-key"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
