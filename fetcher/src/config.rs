use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

use crate::report::DEFAULT_REPORT_URL;

const DEFAULT_CONCURRENCY: usize = 50;
const DEFAULT_STAGGER_MS: u64 = 100;
const DEFAULT_INTERVAL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_LOOKBACK_DAYS: i64 = 1;
const DEFAULT_CHUNK_SIZE: usize = 1500;
const DEFAULT_WRITE_CONCURRENCY: usize = 25;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_COOKIE: &str = "hydrometric";
const DEFAULT_SITE_TIMEZONE: Tz = chrono_tz::America::Toronto;

#[derive(Debug, Clone)]
pub struct Config {
    pub readings_table: Option<String>,
    pub stations_table: Option<String>,
    pub report_base_url: String,
    pub concurrency: usize,
    pub stagger: Duration,
    pub interval: Duration,
    pub lookback_days: i64,
    pub chunk_size: usize,
    pub write_concurrency: usize,
    pub request_timeout: Duration,
    pub session_cookie: String,
    pub site_timezone: Tz,
}

/// Table names are only needed by commands that touch DynamoDB.
#[derive(Debug, Clone)]
pub struct Tables {
    pub readings: String,
    pub stations: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let concurrency = parse_or(&get, "SCRAPE_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        let chunk_size = parse_or(&get, "UPSERT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let write_concurrency =
            parse_or(&get, "UPSERT_WRITE_CONCURRENCY", DEFAULT_WRITE_CONCURRENCY)?;
        let interval_secs = parse_or(&get, "SCRAPE_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?;
        let lookback_days = parse_or(&get, "SCRAPE_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?;
        let timeout_secs =
            parse_or(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        for (key, value) in [
            ("SCRAPE_CONCURRENCY", concurrency as u64),
            ("UPSERT_CHUNK_SIZE", chunk_size as u64),
            ("UPSERT_WRITE_CONCURRENCY", write_concurrency as u64),
            ("SCRAPE_INTERVAL_SECS", interval_secs),
            ("REQUEST_TIMEOUT_SECS", timeout_secs),
        ] {
            if value == 0 {
                return Err(anyhow!("{key} must be greater than zero"));
            }
        }
        if lookback_days < 1 {
            return Err(anyhow!("SCRAPE_LOOKBACK_DAYS must be at least 1"));
        }

        let site_timezone = match get("SITE_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|err| anyhow!("invalid SITE_TIMEZONE '{name}': {err}"))?,
            None => DEFAULT_SITE_TIMEZONE,
        };

        Ok(Self {
            readings_table: get("READINGS_TABLE_NAME"),
            stations_table: get("STATIONS_TABLE_NAME"),
            report_base_url: get("REPORT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REPORT_URL.to_string()),
            concurrency,
            stagger: Duration::from_millis(parse_or(&get, "SCRAPE_STAGGER_MS", DEFAULT_STAGGER_MS)?),
            interval: Duration::from_secs(interval_secs),
            lookback_days,
            chunk_size,
            write_concurrency,
            request_timeout: Duration::from_secs(timeout_secs),
            session_cookie: get("SESSION_COOKIE")
                .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string()),
            site_timezone,
        })
    }

    pub fn tables(&self) -> Result<Tables> {
        let readings = self
            .readings_table
            .clone()
            .ok_or_else(|| anyhow!("Missing env var: READINGS_TABLE_NAME"))?;
        let stations = self
            .stations_table
            .clone()
            .ok_or_else(|| anyhow!("Missing env var: STATIONS_TABLE_NAME"))?;
        Ok(Tables { readings, stations })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("invalid {key} value '{value}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_routine_scrape() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.concurrency, 50);
        assert_eq!(config.chunk_size, 1500);
        assert_eq!(config.lookback_days, 1);
        assert_eq!(config.interval, Duration::from_secs(21_600));
        assert_eq!(config.stagger, Duration::from_millis(100));
        assert_eq!(config.site_timezone, chrono_tz::America::Toronto);
        assert_eq!(config.report_base_url, DEFAULT_REPORT_URL);
        assert!(config.tables().is_err());
    }

    #[test]
    fn values_are_trimmed_and_blank_means_unset() {
        let config = config_from(&[
            ("READINGS_TABLE_NAME", " readings "),
            ("STATIONS_TABLE_NAME", "stations"),
            ("SCRAPE_CONCURRENCY", "  "),
            ("SITE_TIMEZONE", "America/Edmonton"),
        ])
        .unwrap();
        let tables = config.tables().unwrap();
        assert_eq!(tables.readings, "readings");
        assert_eq!(tables.stations, "stations");
        assert_eq!(config.concurrency, 50);
        assert_eq!(config.site_timezone, chrono_tz::America::Edmonton);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("SCRAPE_CONCURRENCY", "many")]).is_err());
        assert!(config_from(&[("SCRAPE_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("UPSERT_CHUNK_SIZE", "0")]).is_err());
        assert!(config_from(&[("SCRAPE_LOOKBACK_DAYS", "0")]).is_err());
        assert!(config_from(&[("SITE_TIMEZONE", "Mars/Olympus")]).is_err());
    }
}
