//! Named cache partitions.
//!
//! Partitions live in memory and, when opened from a path, are written
//! through to a libSQL file so they survive restarts. Disk failures are
//! logged and never fail a cache operation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use libsql::{params, Builder, Connection, Database as LibSqlDatabase};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ResourceResponse, ResponseSource};
use crate::error::{Error, Result};

type Partition = BTreeMap<String, ResourceResponse>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_partitions (
    name TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    PRIMARY KEY (partition, key)
);
";

/// Set of named partitions, each mapping a request key to a stored response.
#[derive(Default)]
pub struct CacheStorage {
    partitions: RwLock<BTreeMap<String, Partition>>,
    disk: Option<DiskCache>,
}

impl fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStorage")
            .field("persistent", &self.disk.is_some())
            .finish_non_exhaustive()
    }
}

impl CacheStorage {
    /// Memory-only storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage backed by the file at `path`, created if missing. Partitions
    /// already on disk are loaded before this returns.
    pub async fn open_persistent(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Builder::new_local(path.to_string_lossy().as_ref())
            .build()
            .await?;
        let conn = db.connect()?;
        conn.execute_batch(SCHEMA).await?;

        let disk = DiskCache { _db: db, conn };
        let partitions = disk.load().await?;
        debug!(
            path = %path.display(),
            partitions = partitions.len(),
            "Loaded cache partitions"
        );

        Ok(Self {
            partitions: RwLock::new(partitions),
            disk: Some(disk),
        })
    }

    /// Create the partition if missing.
    pub async fn open(&self, name: &str) {
        let mut partitions = self.partitions.write().await;
        if partitions.contains_key(name) {
            return;
        }
        partitions.insert(name.to_string(), Partition::new());
        if let Some(disk) = &self.disk {
            log_disk_failure("open", disk.open_partition(name).await);
        }
    }

    pub async fn put(&self, partition: &str, key: &str, response: &ResourceResponse) {
        let stored = for_storage(response.clone());
        let mut partitions = self.partitions.write().await;
        if let Some(disk) = &self.disk {
            log_disk_failure("put", disk.put_entries(partition, &[(key, &stored)]).await);
        }
        partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), stored);
    }

    /// Put several entries at once; readers see all of them or none.
    pub async fn put_all(&self, partition: &str, entries: Vec<(String, ResourceResponse)>) {
        let entries = entries
            .into_iter()
            .map(|(key, response)| (key, for_storage(response)))
            .collect::<Vec<_>>();

        let mut partitions = self.partitions.write().await;
        if let Some(disk) = &self.disk {
            let rows = entries
                .iter()
                .map(|(key, response)| (key.as_str(), response))
                .collect::<Vec<_>>();
            log_disk_failure("put_all", disk.put_entries(partition, &rows).await);
        }
        let target = partitions.entry(partition.to_string()).or_default();
        target.extend(entries);
    }

    pub async fn match_in(&self, partition: &str, key: &str) -> Option<ResourceResponse> {
        self.partitions
            .read()
            .await
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// Look `key` up across every partition.
    pub async fn match_any(&self, key: &str) -> Option<ResourceResponse> {
        self.partitions
            .read()
            .await
            .values()
            .find_map(|entries| entries.get(key))
            .cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.partitions.read().await.keys().cloned().collect()
    }

    pub async fn delete(&self, name: &str) -> bool {
        let mut partitions = self.partitions.write().await;
        let removed = partitions.remove(name).is_some();
        if removed {
            if let Some(disk) = &self.disk {
                log_disk_failure("delete", disk.delete_partition(name).await);
            }
        }
        removed
    }

    /// `(partition, entry count)` pairs.
    pub async fn summary(&self) -> Vec<(String, usize)> {
        self.partitions
            .read()
            .await
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect()
    }
}

/// Stored copies answer as cache hits and never replay per-user headers.
fn for_storage(mut response: ResourceResponse) -> ResourceResponse {
    response.source = ResponseSource::Cache;
    response.headers.remove(SET_COOKIE);
    response
}

fn log_disk_failure(operation: &str, result: Result<()>) {
    if let Err(error) = result {
        warn!(operation, %error, "Cache partition write-through failed");
    }
}

struct DiskCache {
    // Keeps the underlying database alive for the connection's lifetime.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl DiskCache {
    async fn load(&self) -> Result<BTreeMap<String, Partition>> {
        let mut partitions = BTreeMap::new();

        let mut rows = self.conn.query("SELECT name FROM cache_partitions", ()).await?;
        while let Some(row) = rows.next().await? {
            partitions.insert(row.get::<String>(0)?, Partition::new());
        }

        let mut rows = self
            .conn
            .query(
                "SELECT partition, key, status, headers, body FROM cache_entries",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let partition: String = row.get(0)?;
            let key: String = row.get(1)?;
            let status = u16::try_from(row.get::<i64>(2)?)
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| Error::Database(format!("invalid cached status for {key}")))?;
            let headers = decode_headers(&row.get::<String>(3)?)?;
            let body: Vec<u8> = row.get(4)?;

            partitions.entry(partition).or_default().insert(
                key,
                ResourceResponse {
                    status,
                    headers,
                    body,
                    source: ResponseSource::Cache,
                },
            );
        }
        Ok(partitions)
    }

    async fn open_partition(&self, name: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?1)",
                params![name],
            )
            .await?;
        Ok(())
    }

    async fn put_entries(&self, partition: &str, entries: &[(&str, &ResourceResponse)]) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        let result = self.write_entries(partition, entries).await;
        match result {
            Ok(()) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(())
            }
            Err(error) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    async fn write_entries(&self, partition: &str, entries: &[(&str, &ResourceResponse)]) -> Result<()> {
        self.open_partition(partition).await?;
        for (key, response) in entries {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO cache_entries (partition, key, status, headers, body)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        partition,
                        *key,
                        i64::from(response.status.as_u16()),
                        encode_headers(&response.headers)?,
                        response.body.clone()
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn delete_partition(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE partition = ?1", params![name])
            .await?;
        self.conn
            .execute("DELETE FROM cache_partitions WHERE name = ?1", params![name])
            .await?;
        Ok(())
    }
}

/// Headers as a JSON list of `[name, value]` pairs. Values that are not
/// visible ASCII are dropped.
fn encode_headers(headers: &HeaderMap) -> Result<String> {
    let pairs = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect::<Vec<_>>();
    Ok(serde_json::to_string(&pairs)?)
}

fn decode_headers(raw: &str) -> Result<HeaderMap> {
    let pairs: Vec<(String, String)> = serde_json::from_str(raw)?;
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    Ok(headers)
}
