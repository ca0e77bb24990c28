use std::io;

use tally_core::config::ConfigError;
use tally_core::remote::RemoteError;
use tally_core::LocalId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Entry name cannot be empty")]
    EmptyName,
    #[error("Invalid entry id: {0}")]
    InvalidId(String),
    #[error("Entry not found: {0}")]
    EntryNotFound(LocalId),
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
    #[error("Sync is not configured. Set TALLY_REMOTE_URL and TALLY_REMOTE_KEY.")]
    SyncNotConfigured,
}
