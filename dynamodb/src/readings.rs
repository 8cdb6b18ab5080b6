use crate::{
    STATION_ID_ATTR, TIMESTAMP_ATTR, optional_number_value, parse_optional_number_field,
    parse_string_field,
};
use anyhow::{Context, Result, anyhow};
use aws_sdk_dynamodb::{
    Client, error::SdkError, operation::put_item::PutItemError, types::AttributeValue,
};
use chrono::NaiveDateTime;
use futures::StreamExt;
use hydrometric_core::{PersistedReading, TIMESTAMP_KEY_FORMAT};
use std::collections::HashMap;

const WATER_LEVEL_ATTR: &str = "waterLevel";
const DISCHARGE_ATTR: &str = "discharge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A reading with the same key was already stored and was left untouched.
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

impl ChunkOutcome {
    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub fn reading_item(reading: &PersistedReading) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            STATION_ID_ATTR.to_string(),
            AttributeValue::S(reading.station_id.clone()),
        ),
        (
            TIMESTAMP_ATTR.to_string(),
            AttributeValue::S(reading.timestamp_key()),
        ),
        (
            WATER_LEVEL_ATTR.to_string(),
            optional_number_value(reading.water_level),
        ),
        (
            DISCHARGE_ATTR.to_string(),
            optional_number_value(reading.discharge),
        ),
    ])
}

pub fn reading_from_item(item: &HashMap<String, AttributeValue>) -> Result<PersistedReading> {
    let station_id = parse_string_field(item, STATION_ID_ATTR)?;
    let timestamp = parse_string_field(item, TIMESTAMP_ATTR)?;
    let timestamp = NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_KEY_FORMAT)
        .with_context(|| format!("invalid '{TIMESTAMP_ATTR}' value '{timestamp}'"))?;
    Ok(PersistedReading {
        station_id,
        timestamp,
        water_level: parse_optional_number_field(item, WATER_LEVEL_ATTR)?,
        discharge: parse_optional_number_field(item, DISCHARGE_ATTR)?,
    })
}

/// Writes the reading only if no item exists for its `(stationId, timestamp)`
/// key. An existing item is never modified.
pub async fn insert_reading_if_absent(
    client: &Client,
    table_name: &str,
    reading: &PersistedReading,
) -> Result<InsertOutcome> {
    if table_name.is_empty() {
        return Err(anyhow!("readings table name is empty"));
    }

    let result = client
        .put_item()
        .table_name(table_name)
        .set_item(Some(reading_item(reading)))
        .condition_expression("attribute_not_exists(#sid)")
        .expression_attribute_names("#sid", STATION_ID_ATTR)
        .send()
        .await;

    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(SdkError::ServiceError(err)) => {
            if let PutItemError::ConditionalCheckFailedException(_) = err.err() {
                Ok(InsertOutcome::Skipped)
            } else {
                Err(anyhow::Error::new(err.into_err()))
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Inserts a chunk of readings with at most `write_concurrency` puts in flight.
/// Every item is attempted; the chunk fails if any write failed for a reason
/// other than the key already existing.
pub async fn insert_readings(
    client: &Client,
    table_name: &str,
    readings: &[PersistedReading],
    write_concurrency: usize,
) -> Result<ChunkOutcome> {
    let results: Vec<Result<InsertOutcome>> = futures::stream::iter(
        readings
            .iter()
            .map(|reading| insert_reading_if_absent(client, table_name, reading)),
    )
    .buffer_unordered(write_concurrency.max(1))
    .collect()
    .await;

    let mut outcome = ChunkOutcome::default();
    let mut failures = 0usize;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(inserted) => outcome.record(inserted),
            Err(err) => {
                failures += 1;
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err.context(format!(
            "{failures} of {} writes failed ({} inserted, {} already present)",
            readings.len(),
            outcome.inserted,
            outcome.skipped
        ))),
        None => Ok(outcome),
    }
}

pub async fn get_reading(
    client: &Client,
    table_name: &str,
    station_id: &str,
    timestamp: &NaiveDateTime,
) -> Result<Option<PersistedReading>> {
    if table_name.is_empty() {
        return Err(anyhow!("readings table name is empty"));
    }

    let result = client
        .get_item()
        .table_name(table_name)
        .key(STATION_ID_ATTR, AttributeValue::S(station_id.to_string()))
        .key(
            TIMESTAMP_ATTR,
            AttributeValue::S(timestamp.format(TIMESTAMP_KEY_FORMAT).to_string()),
        )
        .send()
        .await?;

    result.item.as_ref().map(reading_from_item).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(water_level: Option<f64>, discharge: Option<f64>) -> PersistedReading {
        PersistedReading {
            station_id: "08MF005".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
            water_level,
            discharge,
        }
    }

    #[test]
    fn reading_item_uses_composite_key_and_nulls() {
        let item = reading_item(&reading(Some(4.21), None));
        assert_eq!(
            item.get("stationId"),
            Some(&AttributeValue::S("08MF005".to_string()))
        );
        assert_eq!(
            item.get("timestamp"),
            Some(&AttributeValue::S("2024-05-01T12:30:00".to_string()))
        );
        assert_eq!(
            item.get("waterLevel"),
            Some(&AttributeValue::N("4.21".to_string()))
        );
        assert_eq!(item.get("discharge"), Some(&AttributeValue::Null(true)));
    }

    #[test]
    fn reading_from_item_reverses_reading_item() {
        let original = reading(None, Some(310.0));
        let parsed = reading_from_item(&reading_item(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn reading_from_item_rejects_bad_timestamp() {
        let mut item = reading_item(&reading(None, None));
        item.insert(
            "timestamp".to_string(),
            AttributeValue::S("2024-05-01 12:30".to_string()),
        );
        assert!(reading_from_item(&item).is_err());
    }

    #[test]
    fn chunk_outcome_counts_each_result() {
        let mut outcome = ChunkOutcome::default();
        outcome.record(InsertOutcome::Inserted);
        outcome.record(InsertOutcome::Skipped);
        outcome.record(InsertOutcome::Inserted);
        assert_eq!(
            outcome,
            ChunkOutcome {
                inserted: 2,
                skipped: 1
            }
        );
    }
}
