//! Local entry record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use super::{Language, RemoteRecord};
use crate::error::{Error, Result};

/// Locally-assigned record identifier. Never reused once handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(i64);

impl LocalId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier assigned by the remote record service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Captured position: latitude, longitude, and accuracy in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

impl Location {
    /// Validate coordinate ranges.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(Error::InvalidInput(format!(
                "accuracy {accuracy} must be a non-negative number of meters"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy,
        })
    }
}

/// A record that has not been written to the local store yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub name: String,
    pub language: Language,
    pub location: Option<Location>,
    pub timestamp: DateTime<Utc>,
    pub remote_id: Option<RemoteId>,
    pub synced: bool,
}

impl EntryDraft {
    /// Build a user submission: trims the name, derives the language tag, and
    /// stamps the creation instant.
    pub fn new(name: &str, location: Option<Location>) -> Result<Self> {
        Self::with_timestamp(name, location, Utc::now())
    }

    /// Same as [`EntryDraft::new`] with an explicit creation instant.
    pub fn with_timestamp(
        name: &str,
        location: Option<Location>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("entry name cannot be empty".into()));
        }

        Ok(Self {
            name: name.to_string(),
            language: Language::detect(name),
            location,
            timestamp,
            remote_id: None,
            synced: false,
        })
    }

    /// Convert a pulled remote record into an already-synced local draft.
    #[must_use]
    pub fn from_remote(remote: &RemoteRecord) -> Self {
        let name = remote.name.trim().to_string();
        let language = remote
            .language
            .as_deref()
            .and_then(|tag| tag.parse().ok())
            .unwrap_or_else(|| Language::detect(&name));

        Self {
            name,
            language,
            location: remote.location(),
            timestamp: remote.timestamp,
            remote_id: Some(remote.id.clone()),
            synced: true,
        }
    }
}

/// An entry as held by the local durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub name: String,
    pub language: Language,
    pub location: Option<Location>,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Failed remote delete attempts recorded against a tombstone.
    pub delete_attempts: u32,
}

impl LocalRecord {
    #[must_use]
    pub fn from_draft(local_id: LocalId, draft: EntryDraft) -> Self {
        Self {
            local_id,
            remote_id: draft.remote_id,
            name: draft.name,
            language: draft.language,
            location: draft.location,
            timestamp: draft.timestamp,
            synced: draft.synced,
            deleted: false,
            deleted_at: None,
            delete_attempts: 0,
        }
    }

    /// Visible to presentation layers.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.deleted
    }

    /// Waiting to be pushed to the remote service.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.synced && !self.deleted
    }

    /// Deleted locally with a remote identity still to be removed.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.deleted && self.remote_id.is_some()
    }

    /// Record remote acceptance. An already-assigned remote id is kept.
    pub fn mark_synced(&mut self, remote_id: RemoteId) {
        if self.remote_id.is_none() {
            self.remote_id = Some(remote_id);
        }
        self.synced = true;
    }

    /// Rewrite as a tombstone carrying the deletion instant.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted = true;
        self.deleted_at = Some(at);
    }
}
