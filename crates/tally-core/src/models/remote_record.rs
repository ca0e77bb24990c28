//! Remote canonical record representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Language, LocalRecord, Location, RemoteId};

/// A row as held by the remote record service.
///
/// The service has no tombstones; deletion there is physical removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(deserialize_with = "deserialize_remote_id")]
    pub id: RemoteId,
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    /// Coordinates are only meaningful as a pair; missing accuracy reads as 0 m.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
                accuracy: self.accuracy.unwrap_or(0.0),
            }),
            _ => None,
        }
    }
}

/// Insert payload sent to the remote record service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRemoteRecord {
    pub name: String,
    pub language: Language,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Serialized as an ISO-8601 instant.
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

impl From<&LocalRecord> for NewRemoteRecord {
    fn from(record: &LocalRecord) -> Self {
        Self {
            name: record.name.clone(),
            language: record.language,
            latitude: record.location.map(|location| location.latitude),
            longitude: record.location.map(|location| location.longitude),
            accuracy: record.location.map(|location| location.accuracy),
            timestamp: record.timestamp,
            synced: true,
        }
    }
}

/// Services hand out numeric or textual keys; both normalise to text.
fn deserialize_remote_id<'de, D>(deserializer: D) -> Result<RemoteId, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) if !value.trim().is_empty() => {
            Ok(RemoteId::new(value.trim()))
        }
        serde_json::Value::Number(value) => Ok(RemoteId::new(value.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "invalid remote id: {other}"
        ))),
    }
}
