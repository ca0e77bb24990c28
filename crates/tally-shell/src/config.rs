use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tally_core::cache::CacheManifest;
use tally_core::config::ConfigError;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub bind_addr: String,
    pub origin_url: Url,
    pub network_timeout: Duration,
    pub cache_version: String,
    /// File the cache partitions are persisted to.
    pub cache_path: PathBuf,
    /// `None` keeps the built-in critical list.
    pub critical_paths: Option<Vec<String>>,
    pub optional_paths: Option<Vec<String>>,
    pub data_prefixes: Vec<String>,
}

impl ShellConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TALLY_SHELL_BIND_ADDR", "127.0.0.1:8787");

        let origin = required_trimmed(&lookup, "TALLY_SHELL_ORIGIN_URL")?;
        let origin_url = Url::parse(&origin).map_err(|error| {
            ConfigError::Invalid(format!("TALLY_SHELL_ORIGIN_URL is not a valid URL: {error}"))
        })?;
        if !matches!(origin_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(
                "TALLY_SHELL_ORIGIN_URL must start with http:// or https://".to_string(),
            ));
        }

        let timeout_ms = value_or_default(&lookup, "TALLY_SHELL_NETWORK_TIMEOUT_MS", "3000")
            .parse::<u64>()
            .ok()
            .filter(|value| (1..=60_000).contains(value))
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "TALLY_SHELL_NETWORK_TIMEOUT_MS must be an integer between 1 and 60000"
                        .to_string(),
                )
            })?;

        let cache_version = value_or_default(&lookup, "TALLY_SHELL_CACHE_VERSION", "v1");
        let cache_path = lookup("TALLY_SHELL_CACHE_PATH")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map_or_else(default_cache_path, PathBuf::from);
        let critical_paths = path_list(&lookup, "TALLY_SHELL_CRITICAL_PATHS")?;
        let optional_paths = path_list(&lookup, "TALLY_SHELL_OPTIONAL_PATHS")?;
        let data_prefixes = path_list(&lookup, "TALLY_SHELL_DATA_PREFIXES")?
            .unwrap_or_else(|| vec!["/rest/v1/".to_string()]);

        Ok(Self {
            bind_addr,
            origin_url,
            network_timeout: Duration::from_millis(timeout_ms),
            cache_version,
            cache_path,
            critical_paths,
            optional_paths,
            data_prefixes,
        })
    }

    pub fn manifest(&self) -> CacheManifest {
        let defaults = CacheManifest::default();
        CacheManifest {
            version: self.cache_version.clone(),
            critical: self.critical_paths.clone().unwrap_or(defaults.critical),
            optional: self.optional_paths.clone().unwrap_or(defaults.optional),
            data_prefixes: self.data_prefixes.clone(),
            network_timeout: self.network_timeout,
            shell_root: defaults.shell_root,
        }
    }
}

pub fn default_cache_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("shell-cache.db")
}

/// Comma-separated absolute paths. An empty value means an empty list.
fn path_list(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<Vec<String>>, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };

    let paths = raw
        .split(',')
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    if let Some(bad) = paths.iter().find(|path| !path.starts_with('/')) {
        return Err(ConfigError::Invalid(format!(
            "{name} entries must start with '/': {bad}"
        )));
    }
    Ok(Some(paths))
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
