use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Cell content the report uses when a sensor has no value for a row.
pub const MISSING_VALUE_PLACEHOLDER: &str = "-";

/// Canonical text form of a persisted reading timestamp.
pub const TIMESTAMP_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// A monitored gauge. Populated out of band and read-only to the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub station_id: String,
    pub name: Option<String>,
    pub province: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Station {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            name: None,
            province: None,
            latitude: None,
            longitude: None,
        }
    }
}

/// One row of the real-time table, as scraped. The timestamp is kept as the
/// site-local text of the first cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    pub station_id: String,
    pub timestamp: String,
    pub water_level: Option<f64>,
    pub discharge: Option<f64>,
}

/// A reading as stored, unique on `(station_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedReading {
    pub station_id: String,
    pub timestamp: NaiveDateTime,
    pub water_level: Option<f64>,
    pub discharge: Option<f64>,
}

impl PersistedReading {
    /// Returns `None` when the scraped timestamp is not a recognisable date-time.
    pub fn from_raw(raw: RawReading) -> Option<Self> {
        let timestamp = parse_site_timestamp(&raw.timestamp)?;
        Some(Self {
            station_id: raw.station_id,
            timestamp,
            water_level: raw.water_level,
            discharge: raw.discharge,
        })
    }

    pub fn timestamp_key(&self) -> String {
        self.timestamp.format(TIMESTAMP_KEY_FORMAT).to_string()
    }
}

/// Parses the site's `YYYY-MM-DD HH:MM[:SS]` cell text, ignoring a trailing
/// time zone label such as `MST` or `UTC-05:00`.
pub fn parse_site_timestamp(text: &str) -> Option<NaiveDateTime> {
    let mut parts = text.split_whitespace();
    let date = parts.next()?;
    let candidate = match parts.next() {
        Some(time) if time.starts_with(|c: char| c.is_ascii_digit()) => {
            format!("{date} {time}")
        }
        _ => date.to_string(),
    };
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&candidate, format).ok())
}

/// Parses a measurement cell. The placeholder, empty cells and anything that
/// does not start with a finite number yield `None`; a trailing unit is ignored.
pub fn parse_measurement(text: &str) -> Option<f64> {
    let token = text.split_whitespace().next()?;
    if token == MISSING_VALUE_PLACEHOLDER {
        return None;
    }
    token
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
