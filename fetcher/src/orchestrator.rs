use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::{FutureExt, StreamExt};
use hydrometric_core::{RawReading, Station};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::extract::extract_readings;
use crate::logging::{Logger, TARGET};
use crate::report::{DateRange, FetchError, ReportSource};
use crate::upsert::{ReadingStore, ReadingUpserter, UpsertSummary};

/// Source of the stations to scrape, read once at the start of every run.
pub trait StationRegistry {
    async fn list_stations(&self) -> Result<Vec<Station>>;
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to load the station list: {0:#}")]
    Registry(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{failed_chunks} chunk(s) could not be stored")]
    Persistence {
        failed_chunks: usize,
        summary: UpsertSummary,
    },
    #[error("station task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub concurrency: usize,
    pub stagger: Duration,
    pub lookback_days: i64,
    pub site_timezone: Tz,
}

impl From<&Config> for ScrapeSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            stagger: config.stagger,
            lookback_days: config.lookback_days,
            site_timezone: config.site_timezone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationScrape {
    pub extracted: usize,
    pub upsert: UpsertSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub stations_found: usize,
    pub stations_succeeded: usize,
    pub failed_stations: Vec<String>,
    pub readings_extracted: usize,
    pub upsert: UpsertSummary,
    pub duration_ms: u64,
}

pub struct ScrapeOrchestrator<R, F, S> {
    registry: R,
    fetcher: F,
    upserter: ReadingUpserter<S>,
    settings: ScrapeSettings,
}

impl<R, F, S> ScrapeOrchestrator<R, F, S>
where
    R: StationRegistry,
    F: ReportSource,
    S: ReadingStore,
{
    pub fn new(
        registry: R,
        fetcher: F,
        upserter: ReadingUpserter<S>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            registry,
            fetcher,
            upserter,
            settings,
        }
    }

    /// Scrapes every registered station once. Station failures are logged and
    /// reported; only an unreadable station list fails the run.
    pub async fn run_once(&self) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        Logger::new().info("run.started", "Scrape run started");

        let stations = self
            .registry
            .list_stations()
            .await
            .map_err(RunError::Registry)?;
        let range = DateRange::lookback(
            started_at,
            self.settings.site_timezone,
            self.settings.lookback_days,
        );
        Logger::new()
            .count(stations.len())
            .info("run.stations_loaded", "Loaded station list");

        let tasks = stations.iter().enumerate().map(|(index, station)| {
            let not_before = clock + self.stagger_offset(index);
            async move {
                tokio::time::sleep_until(not_before).await;
                let result = AssertUnwindSafe(self.scrape_station(&station.station_id, range))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(ScrapeError::Panicked(panic_message(panic))));
                (station.station_id.as_str(), result)
            }
        });

        let outcomes: Vec<_> = futures::stream::iter(tasks)
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = RunReport {
            started_at,
            start_date: range.start,
            end_date: range.end,
            stations_found: stations.len(),
            stations_succeeded: 0,
            failed_stations: Vec::new(),
            readings_extracted: 0,
            upsert: UpsertSummary::default(),
            duration_ms: 0,
        };
        for (station_id, outcome) in outcomes {
            match outcome {
                Ok(scrape) => {
                    report.stations_succeeded += 1;
                    report.readings_extracted += scrape.extracted;
                    report.upsert.merge(&scrape.upsert);
                }
                Err(err) => {
                    if let ScrapeError::Persistence { summary, .. } = &err {
                        report.readings_extracted += summary.received;
                        report.upsert.merge(summary);
                    }
                    if let ScrapeError::Panicked(_) = &err {
                        Logger::new().station(station_id).error(
                            "station.panicked",
                            &err,
                            "Station task panicked",
                        );
                    }
                    report.failed_stations.push(station_id.to_string());
                }
            }
        }
        report.failed_stations.sort();
        report.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            target: TARGET,
            event = "run.completed",
            stations_found = report.stations_found,
            stations_succeeded = report.stations_succeeded,
            stations_failed = report.failed_stations.len(),
            readings_extracted = report.readings_extracted,
            inserted = report.upsert.inserted,
            skipped = report.upsert.skipped,
            rejected = report.upsert.rejected,
            failed_chunks = report.upsert.failed_chunks,
            duration_ms = report.duration_ms,
            "Scrape run completed"
        );
        Ok(report)
    }

    /// Fetch, extract and store one station, in that order.
    pub async fn scrape_station(
        &self,
        station_id: &str,
        range: DateRange,
    ) -> Result<StationScrape, ScrapeError> {
        let readings = self
            .fetch_and_extract(station_id, range)
            .await
            .inspect_err(|err| {
                Logger::new().station(station_id).error(
                    "station.fetch_failed",
                    err,
                    "Error fetching report for station",
                );
            })?;
        self.store_readings(station_id, readings).await
    }

    pub async fn fetch_and_extract(
        &self,
        station_id: &str,
        range: DateRange,
    ) -> Result<Vec<RawReading>, FetchError> {
        let html = self.fetcher.fetch(station_id, range).await?;
        Ok(extract_readings(&html, station_id))
    }

    pub async fn store_readings(
        &self,
        station_id: &str,
        readings: Vec<RawReading>,
    ) -> Result<StationScrape, ScrapeError> {
        let extracted = readings.len();
        if extracted == 0 {
            Logger::new()
                .station(station_id)
                .warn("station.no_readings", "No readings found in report");
        }

        let upsert = self.upserter.upsert(readings).await;
        if upsert.failed_chunks > 0 {
            let err = ScrapeError::Persistence {
                failed_chunks: upsert.failed_chunks,
                summary: upsert,
            };
            Logger::new().station(station_id).error(
                "station.store_failed",
                &err,
                "Error storing readings for station",
            );
            return Err(err);
        }

        Logger::new()
            .station(station_id)
            .count(upsert.inserted)
            .info(
                "station.scraped",
                &format!(
                    "Extracted {extracted} readings, {} new, {} already stored",
                    upsert.inserted, upsert.skipped
                ),
            );
        Ok(StationScrape { extracted, upsert })
    }

    fn stagger_offset(&self, index: usize) -> Duration {
        self.settings
            .stagger
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
