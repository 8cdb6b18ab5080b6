use anyhow::Result;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use hydrometric_core::{PersistedReading, Station};
use hydrometric_dynamodb::readings::{ChunkOutcome, insert_readings};
use hydrometric_dynamodb::stations::list_stations;

use crate::config::Tables;
use crate::logging::Logger;
use crate::orchestrator::StationRegistry;
use crate::upsert::ReadingStore;

const STATIONS_PAGE_SIZE: i32 = 500;

/// Readings and stations tables behind one shared client.
#[derive(Clone)]
pub struct DynamoDbStore {
    client: DynamoDbClient,
    tables: Tables,
    write_concurrency: usize,
}

impl DynamoDbStore {
    pub fn new(client: DynamoDbClient, tables: Tables, write_concurrency: usize) -> Self {
        Self {
            client,
            tables,
            write_concurrency,
        }
    }

    pub fn client(&self) -> &DynamoDbClient {
        &self.client
    }

    pub fn readings_table(&self) -> &str {
        &self.tables.readings
    }
}

impl ReadingStore for DynamoDbStore {
    async fn insert_chunk(&self, chunk: &[PersistedReading]) -> Result<ChunkOutcome> {
        insert_readings(
            &self.client,
            &self.tables.readings,
            chunk,
            self.write_concurrency,
        )
        .await
    }
}

impl StationRegistry for DynamoDbStore {
    async fn list_stations(&self) -> Result<Vec<Station>> {
        let scan = list_stations(&self.client, &self.tables.stations, STATIONS_PAGE_SIZE).await?;
        if scan.skipped > 0 {
            Logger::new()
                .count(scan.skipped)
                .warn("registry.rows_skipped", "Stations rows without a station id skipped");
        }
        Ok(scan.stations)
    }
}
