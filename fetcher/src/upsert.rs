use anyhow::Result;
use hydrometric_core::{PersistedReading, RawReading};
use hydrometric_dynamodb::readings::ChunkOutcome;
use serde::Serialize;

use crate::logging::Logger;

/// Insert-if-absent persistence keyed by `(station_id, timestamp)`.
pub trait ReadingStore {
    async fn insert_chunk(&self, chunk: &[PersistedReading]) -> Result<ChunkOutcome>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub received: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
}

impl UpsertSummary {
    pub fn merge(&mut self, other: &UpsertSummary) {
        self.received += other.received;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
        self.chunks += other.chunks;
        self.failed_chunks += other.failed_chunks;
    }
}

pub struct ReadingUpserter<S> {
    store: S,
    chunk_size: usize,
}

impl<S: ReadingStore> ReadingUpserter<S> {
    pub fn new(store: S, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Persists `readings` chunk by chunk. A failed chunk is logged and does
    /// not stop the remaining chunks.
    pub async fn upsert(&self, readings: Vec<RawReading>) -> UpsertSummary {
        let mut summary = UpsertSummary {
            received: readings.len(),
            ..UpsertSummary::default()
        };

        let mut persisted = Vec::with_capacity(readings.len());
        for raw in readings {
            let station_id = raw.station_id.clone();
            let timestamp = raw.timestamp.clone();
            match PersistedReading::from_raw(raw) {
                Some(reading) => persisted.push(reading),
                None => {
                    summary.rejected += 1;
                    Logger::new().station(station_id).error_text(timestamp).warn(
                        "upsert.row_rejected",
                        "Skipping reading with unparseable timestamp",
                    );
                }
            }
        }

        for (index, chunk) in persisted.chunks(self.chunk_size).enumerate() {
            summary.chunks += 1;
            match self.store.insert_chunk(chunk).await {
                Ok(outcome) => {
                    summary.inserted += outcome.inserted;
                    summary.skipped += outcome.skipped;
                }
                Err(err) => {
                    summary.failed_chunks += 1;
                    Logger::new().count(chunk.len()).error(
                        "upsert.chunk_failed",
                        &err,
                        &format!("Failed to store chunk {}", index + 1),
                    );
                }
            }
        }

        summary
    }
}
