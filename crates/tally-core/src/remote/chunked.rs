//! Chunked bulk insert with per-chunk failure isolation.

use tracing::{debug, warn};

use super::RemoteEntries;
use crate::models::{NewRemoteRecord, RemoteRecord};

pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// A chunk the service rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Zero-based chunk index.
    pub index: usize,
    /// Offset of the chunk's first record in the input slice.
    pub offset: usize,
    pub len: usize,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ChunkedInsertReport {
    /// Accepted records as `(input offset, canonical copy)`.
    pub inserted: Vec<(usize, RemoteRecord)>,
    pub failed: Vec<ChunkFailure>,
}

impl ChunkedInsertReport {
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.iter().map(|failure| failure.len).sum()
    }
}

/// Insert `records` in chunks of `chunk_size` (0 means the default of 50).
///
/// A rejected chunk is logged and skipped; later chunks still run.
pub async fn insert_chunked<R: RemoteEntries + ?Sized>(
    remote: &R,
    records: &[NewRemoteRecord],
    chunk_size: usize,
) -> ChunkedInsertReport {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let mut report = ChunkedInsertReport::default();
    for (index, chunk) in records.chunks(chunk_size).enumerate() {
        let offset = index * chunk_size;
        match remote.insert_batch(chunk).await {
            Ok(inserted) => {
                debug!(chunk = index, count = inserted.len(), "Inserted chunk");
                report.inserted.extend(
                    inserted
                        .into_iter()
                        .enumerate()
                        .map(|(position, record)| (offset + position, record)),
                );
            }
            Err(error) => {
                warn!(chunk = index, len = chunk.len(), %error, "Chunk insert failed");
                report.failed.push(ChunkFailure {
                    index,
                    offset,
                    len: chunk.len(),
                    error: error.to_string(),
                });
            }
        }
    }
    report
}
