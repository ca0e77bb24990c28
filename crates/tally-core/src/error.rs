//! Error types for tally-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote record service error
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Whether the error came from the remote service rather than local state.
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
