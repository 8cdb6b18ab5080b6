use crate::{
    STATION_ID_ATTR, parse_optional_number_field, parse_optional_string_field,
    parse_string_field,
};
use anyhow::{Result, anyhow};
use aws_sdk_dynamodb::{Client, types::AttributeValue};
use hydrometric_core::Station;
use std::collections::HashMap;

/// Only the station id is required; metadata that does not parse is dropped.
pub fn station_from_item(item: &HashMap<String, AttributeValue>) -> Result<Station> {
    let station_id = parse_string_field(item, STATION_ID_ATTR)?;
    let station_id = station_id.trim().to_string();
    if station_id.is_empty() {
        return Err(anyhow!("empty '{}' field", STATION_ID_ATTR));
    }

    Ok(Station {
        station_id,
        name: parse_optional_string_field(item, "name").ok().flatten(),
        province: parse_optional_string_field(item, "province").ok().flatten(),
        latitude: parse_optional_number_field(item, "latitude").ok().flatten(),
        longitude: parse_optional_number_field(item, "longitude").ok().flatten(),
    })
}

/// Stations read from one scan, plus the number of rows without a usable id.
#[derive(Debug, Default)]
pub struct StationScan {
    pub stations: Vec<Station>,
    pub skipped: usize,
}

impl StationScan {
    fn add_items(&mut self, items: impl IntoIterator<Item = HashMap<String, AttributeValue>>) {
        for item in items {
            match station_from_item(&item) {
                Ok(station) => self.stations.push(station),
                Err(_) => self.skipped += 1,
            }
        }
    }
}

/// Scans the whole stations table. Stations are sorted by id with duplicates
/// removed; rows without a station id are counted and left out.
pub async fn list_stations(
    client: &Client,
    table_name: &str,
    page_size: i32,
) -> Result<StationScan> {
    if table_name.is_empty() {
        return Err(anyhow!("stations table name is empty"));
    }

    let page_size = page_size.clamp(1, 1000);
    let mut scan = StationScan::default();
    let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let mut request = client.scan().table_name(table_name).limit(page_size);

        if let Some(key) = last_evaluated_key.take() {
            request = request.set_exclusive_start_key(Some(key));
        }

        let response = request.send().await?;
        if let Some(items) = response.items {
            scan.add_items(items);
        }

        match response.last_evaluated_key {
            Some(key) if !key.is_empty() => {
                last_evaluated_key = Some(key);
            }
            _ => break,
        }
    }

    scan.stations = sort_and_dedup(scan.stations);
    Ok(scan)
}

fn sort_and_dedup(mut stations: Vec<Station>) -> Vec<Station> {
    stations.sort_by(|a, b| a.station_id.cmp(&b.station_id));
    stations.dedup_by(|a, b| a.station_id == b.station_id);
    stations
}
