//! Classification of inbound message text

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::geojson::FEATURE;
use crate::types::{Geometry, LocationReading, ReadingProperties};

/// Why an inbound payload cannot be rendered as a reading
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedReason {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Payload is not a GeoJSON Feature")]
    NotAFeature,
    #[error("Feature has no geometry")]
    MissingGeometry,
    #[error("Feature has no properties")]
    MissingProperties,
    #[error("Unusable geometry: {0}")]
    UnusableGeometry(String),
    #[error("Unusable properties: {0}")]
    UnusableProperties(String),
}

/// Result of parsing one inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    ValidReading(LocationReading),
    Malformed(MalformedReason),
}

impl ParsedPayload {
    /// Parse message text. A payload is a reading only if it is JSON with
    /// `type == "Feature"` and both `geometry` and `properties` present.
    pub fn parse(text: &str) -> Self {
        match parse_reading(text) {
            Ok(reading) => ParsedPayload::ValidReading(reading),
            Err(reason) => ParsedPayload::Malformed(reason),
        }
    }

    pub fn reading(&self) -> Option<&LocationReading> {
        match self {
            ParsedPayload::ValidReading(reading) => Some(reading),
            ParsedPayload::Malformed(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ParsedPayload::ValidReading(_))
    }
}

fn parse_reading(text: &str) -> Result<LocationReading, MalformedReason> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedReason::InvalidJson(e.to_string()))?;

    if value.get("type").and_then(Value::as_str) != Some(FEATURE) {
        return Err(MalformedReason::NotAFeature);
    }

    let geometry = present(&value, "geometry").ok_or(MalformedReason::MissingGeometry)?;
    let properties = present(&value, "properties").ok_or(MalformedReason::MissingProperties)?;

    let geometry = Geometry::deserialize(geometry)
        .map_err(|e| MalformedReason::UnusableGeometry(e.to_string()))?;
    let properties = ReadingProperties::deserialize(properties)
        .map_err(|e| MalformedReason::UnusableProperties(e.to_string()))?;

    Ok(LocationReading::from_parts(geometry, properties))
}

/// Member lookup that treats an explicit `null` the same as a missing key
fn present<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|member| !member.is_null())
}
