use anyhow::{Result, anyhow};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as AWSClient;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use hydrometric_core::parse_site_timestamp;
use hydrometric_dynamodb::readings::get_reading;
use reqwest::Client as HTTPClient;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::extract::extract_readings;
use crate::logging::Logger;
use crate::orchestrator::{ScrapeOrchestrator, ScrapeSettings};
use crate::report::{DateRange, HttpReportFetcher, ReportSource};
use crate::store::DynamoDbStore;
use crate::upsert::ReadingUpserter;
mod config;
mod extract;
mod logging;
mod orchestrator;
mod report;
mod scheduler;
mod store;
mod upsert;

type Orchestrator = ScrapeOrchestrator<DynamoDbStore, HttpReportFetcher, DynamoDbStore>;

#[derive(Parser)]
#[command(name = "hydrometric-fetcher")]
#[command(about = "Scrapes real-time water level and discharge readings into DynamoDB")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every station now, then on the configured interval (default)
    Serve,
    /// Scrape every station once and print the run report
    Once,
    /// Scrape a single station for an explicit date range
    Station {
        station_id: String,
        /// First day to request (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day to request (YYYY-MM-DD), defaults to today at the site
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Days before `end` to request when `--start` is not given
        #[arg(long, conflicts_with = "start")]
        days: Option<i64>,
        /// Print the extracted readings instead of storing them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()) // Enable log level filtering via `RUST_LOG` env var
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let http_client = HTTPClient::builder()
        .timeout(config.request_timeout)
        .build()?;
    let fetcher = HttpReportFetcher::new(
        http_client,
        config.report_base_url.as_str(),
        config.session_cookie.as_str(),
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let (orchestrator, _) = build_orchestrator(&config, fetcher).await?;
            Logger::new()
                .duration_ms(u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX))
                .info("scheduler.started", "Scheduler started");
            scheduler::run_schedule(&orchestrator, config.interval, shutdown_signal()).await;
        }
        Command::Once => {
            let (orchestrator, _) = build_orchestrator(&config, fetcher).await?;
            let report = orchestrator.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Station {
            station_id,
            start,
            end,
            days,
            dry_run,
        } => {
            let range = station_range(&config, start, end, days)?;
            if dry_run {
                let html = fetcher.fetch(&station_id, range).await?;
                let readings = extract_readings(&html, &station_id);
                println!("{}", serde_json::to_string_pretty(&readings)?);
            } else {
                scrape_single_station(&config, fetcher, &station_id, range).await?;
            }
        }
    }
    Ok(())
}

async fn build_orchestrator(
    config: &Config,
    fetcher: HttpReportFetcher,
) -> Result<(Orchestrator, DynamoDbStore)> {
    let tables = config.tables()?;
    let dynamodb_client = AWSClient::new(&aws_config::defaults(BehaviorVersion::latest()).load().await);
    let store = DynamoDbStore::new(dynamodb_client, tables, config.write_concurrency);
    let orchestrator = ScrapeOrchestrator::new(
        store.clone(),
        fetcher,
        ReadingUpserter::new(store.clone(), config.chunk_size),
        ScrapeSettings::from(config),
    );
    Ok((orchestrator, store))
}

async fn scrape_single_station(
    config: &Config,
    fetcher: HttpReportFetcher,
    station_id: &str,
    range: DateRange,
) -> Result<()> {
    let (orchestrator, store) = build_orchestrator(config, fetcher).await?;
    let readings = orchestrator.fetch_and_extract(station_id, range).await?;
    let latest = readings
        .iter()
        .filter_map(|reading| parse_site_timestamp(&reading.timestamp))
        .max();
    let scrape = orchestrator.store_readings(station_id, readings).await?;
    let latest_stored = match latest {
        Some(timestamp) => {
            get_reading(store.client(), store.readings_table(), station_id, &timestamp).await?
        }
        None => None,
    };

    let output = json!({
        "stationId": station_id,
        "startDate": range.start,
        "endDate": range.end,
        "scrape": scrape,
        "latestStored": latest_stored,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn station_range(
    config: &Config,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    days: Option<i64>,
) -> Result<DateRange> {
    let today = Utc::now().with_timezone(&config.site_timezone).date_naive();
    let end = end.unwrap_or(today);
    let start = match start {
        Some(start) => start,
        None => {
            let days = days.unwrap_or(config.lookback_days);
            if days < 1 {
                return Err(anyhow!("--days must be at least 1"));
            }
            end - Duration::days(days)
        }
    };
    DateRange::new(start, end).ok_or_else(|| anyhow!("--start {start} is after --end {end}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            Logger::new().error("signal.install_failed", &err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                Logger::new().error("signal.install_failed", &err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn explicit_range_is_kept() {
        let range =
            station_range(&config(), Some(date(2024, 1, 1)), Some(date(2024, 1, 7)), None).unwrap();
        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.end, date(2024, 1, 7));
    }

    #[test]
    fn days_count_back_from_end() {
        let range = station_range(&config(), None, Some(date(2024, 3, 10)), Some(3)).unwrap();
        assert_eq!(range.start, date(2024, 3, 7));
        assert_eq!(range.end, date(2024, 3, 10));
    }

    #[test]
    fn inverted_or_empty_ranges_are_rejected() {
        assert!(station_range(&config(), Some(date(2024, 3, 10)), Some(date(2024, 3, 1)), None).is_err());
        assert!(station_range(&config(), None, Some(date(2024, 3, 10)), Some(0)).is_err());
    }

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["hydrometric-fetcher"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from([
            "hydrometric-fetcher",
            "station",
            "05BH004",
            "--days",
            "3",
            "--dry-run",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Station { days: Some(3), dry_run: true, .. })
        ));
    }
}
