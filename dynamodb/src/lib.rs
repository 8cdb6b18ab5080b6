mod parse;
pub mod readings;
pub mod stations;
pub use parse::{
    optional_number_value, parse_number_field, parse_optional_number_field,
    parse_optional_string_field, parse_string_field,
};

/// Partition key of both tables.
pub const STATION_ID_ATTR: &str = "stationId";
/// Sort key of the readings table.
pub const TIMESTAMP_ATTR: &str = "timestamp";
