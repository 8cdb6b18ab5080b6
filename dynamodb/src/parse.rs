use anyhow::{Result, anyhow};
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

pub fn parse_string_field(item: &HashMap<String, AttributeValue>, field: &str) -> Result<String> {
    match item.get(field) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        _ => Err(anyhow!("Missing or invalid '{}' field", field)),
    }
}

pub fn parse_optional_string_field(
    item: &HashMap<String, AttributeValue>,
    field: &str,
) -> Result<Option<String>> {
    match item.get(field) {
        Some(AttributeValue::S(s)) if s.trim().is_empty() => Ok(None),
        Some(AttributeValue::S(s)) => Ok(Some(s.clone())),
        Some(AttributeValue::Null(_)) | None => Ok(None),
        Some(other) => Err(anyhow!(
            "Field '{}' has unexpected attribute type: {:?}",
            field,
            other
        )),
    }
}

pub fn parse_number_field<T: std::str::FromStr>(
    item: &HashMap<String, AttributeValue>,
    field: &str,
) -> Result<T>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    match item.get(field) {
        Some(AttributeValue::N(n)) | Some(AttributeValue::S(n)) => n.parse::<T>().map_err(|e| {
            anyhow!(
                "Failed to parse '{}' field with value '{}' as number: {}",
                field,
                n,
                e
            )
        }),
        _ => Err(anyhow!("Missing or invalid '{}' field", field)),
    }
}

/// Like [`parse_number_field`], but a missing attribute or a DynamoDB `NULL`
/// is `None`. Station metadata written by hand sometimes stores coordinates as
/// strings, so `S` is accepted too.
pub fn parse_optional_number_field<T: std::str::FromStr>(
    item: &HashMap<String, AttributeValue>,
    field: &str,
) -> Result<Option<T>>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    match item.get(field) {
        Some(AttributeValue::Null(_)) | None => Ok(None),
        Some(AttributeValue::S(s)) if s.trim().is_empty() => Ok(None),
        Some(_) => parse_number_field(item, field).map(Some),
    }
}

pub fn optional_number_value(value: Option<f64>) -> AttributeValue {
    match value {
        Some(value) => AttributeValue::N(value.to_string()),
        None => AttributeValue::Null(true),
    }
}
