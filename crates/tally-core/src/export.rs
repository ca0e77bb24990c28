//! Entry export and import helpers.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{EntryDraft, Language, LocalRecord, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// One entry as written to an export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
}

impl From<&LocalRecord> for ExportEntry {
    fn from(record: &LocalRecord) -> Self {
        Self {
            local_id: Some(record.local_id.get()),
            remote_id: record.remote_id.as_ref().map(ToString::to_string),
            name: record.name.clone(),
            language: Some(record.language),
            latitude: record.location.map(|location| location.latitude),
            longitude: record.location.map(|location| location.longitude),
            accuracy: record.location.map(|location| location.accuracy),
            timestamp: record.timestamp,
            synced: record.synced,
        }
    }
}

impl ExportEntry {
    /// Rebuild a local draft. The language tag is re-derived from the name
    /// when the file omits it.
    pub fn into_draft(self) -> Result<EntryDraft> {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location::new(
                latitude,
                longitude,
                self.accuracy.unwrap_or(0.0),
            )?),
            _ => None,
        };
        let mut draft = EntryDraft::with_timestamp(&self.name, location, self.timestamp)?;
        if let Some(language) = self.language {
            draft.language = language;
        }
        Ok(draft)
    }
}

pub fn render_json_export(entries: &[LocalRecord]) -> serde_json::Result<String> {
    let items = entries.iter().map(ExportEntry::from).collect::<Vec<_>>();
    serde_json::to_string_pretty(&items)
}

#[must_use]
pub fn render_csv_export(entries: &[LocalRecord]) -> String {
    let mut output =
        String::from("local_id,remote_id,name,language,latitude,longitude,accuracy,timestamp,synced\n");

    for entry in entries {
        let location = entry.location;
        let _ = writeln!(
            output,
            "{},{},{},{},{},{},{},{},{}",
            entry.local_id,
            entry.remote_id.as_ref().map(ToString::to_string).unwrap_or_default(),
            csv_field(&entry.name),
            entry.language,
            location.map(|l| l.latitude.to_string()).unwrap_or_default(),
            location.map(|l| l.longitude.to_string()).unwrap_or_default(),
            location.map(|l| l.accuracy.to_string()).unwrap_or_default(),
            entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            entry.synced
        );
    }

    output
}

pub fn render_entries_export(entries: &[LocalRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(render_json_export(entries)?),
        ExportFormat::Csv => Ok(render_csv_export(entries)),
    }
}

/// Parse a JSON export into drafts ready to be stored as new, unsynced
/// entries.
pub fn parse_json_import(payload: &str) -> Result<Vec<EntryDraft>> {
    let items: Vec<ExportEntry> = serde_json::from_str(payload)?;
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            item.into_draft().map_err(|error| {
                Error::InvalidInput(format!("import item {index}: {error}"))
            })
        })
        .collect()
}

#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("tally-export-{timestamp_ms}.{}", format.extension())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocalId, RemoteId};
    use pretty_assertions::assert_eq;

    fn sample() -> LocalRecord {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let location = Location::new(28.6139, 77.209, 12.5).unwrap();
        let mut record = LocalRecord::from_draft(
            LocalId::new(7),
            EntryDraft::with_timestamp("Sharma, \"Ravi\"", Some(location), timestamp).unwrap(),
        );
        record.mark_synced(RemoteId::new("42"));
        record
    }

    #[test]
    fn csv_export_quotes_names_and_formats_timestamps() {
        let rendered = render_csv_export(&[sample()]);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "7,42,\"Sharma, \"\"Ravi\"\"\",en,28.6139,77.209,12.5,2024-05-01T10:30:00.000Z,true"
        );
    }

    #[test]
    fn json_export_can_be_imported_as_fresh_drafts() {
        let rendered = render_json_export(&[sample()]).unwrap();
        assert!(rendered.contains("\"language\": \"en\""));
        assert!(rendered.contains("\"timestamp\": \"2024-05-01T10:30:00Z\""));

        let drafts = parse_json_import(&rendered).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].name, "Sharma, \"Ravi\"");
        assert_eq!(drafts[0].location, sample().location);
        assert_eq!(drafts[0].timestamp, sample().timestamp);
        assert!(!drafts[0].synced);
        assert!(drafts[0].remote_id.is_none());
    }

    #[test]
    fn import_derives_missing_language_and_rejects_blank_names() {
        let drafts =
            parse_json_import(r#"[{"name":"सीता","timestamp":"2024-05-01T10:30:00Z"}]"#).unwrap();
        assert_eq!(drafts[0].language, Language::Hi);

        let error = parse_json_import(r#"[{"name":"  ","timestamp":"2024-05-01T10:30:00Z"}]"#)
            .unwrap_err();
        assert!(error.to_string().contains("import item 0"));
    }

    #[test]
    fn suggested_export_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Csv, 123),
            "tally-export-123.csv"
        );
    }
}
