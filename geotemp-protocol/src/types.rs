//! Core wire types and data structures

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;

use crate::protocol::temperature::{HOT_FROM_CELSIUS, MILD_FROM_CELSIUS};

/// Common error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// GeoJSON position, longitude first on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

impl TryFrom<Vec<f64>> for Coordinates {
    type Error = ProtocolError;

    /// Accepts `[lon, lat]` and `[lon, lat, altitude]`; altitude is dropped.
    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [longitude, latitude, ..] if longitude.is_finite() && latitude.is_finite() => {
                Ok(Self::new(*latitude, *longitude))
            }
            [_, _, ..] => Err(ProtocolError::InvalidCoordinates(
                "longitude and latitude must be finite".to_string(),
            )),
            _ => Err(ProtocolError::InvalidCoordinates(format!(
                "expected [longitude, latitude], got {} value(s)",
                values.len()
            ))),
        }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(coordinates: Coordinates) -> Self {
        [coordinates.longitude, coordinates.latitude]
    }
}

/// The `type` member of a feature; only `"Feature"` exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Feature,
}

/// Feature geometry. Readings are always single points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Coordinates },
}

/// Temperature in degrees Celsius, kept as the JSON number it arrived as so
/// that integers stay integers when re-serialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(Number);

impl Temperature {
    pub fn celsius(&self) -> f64 {
        self.0.as_f64().unwrap_or_default()
    }

    pub fn band(&self) -> TemperatureBand {
        TemperatureBand::from_celsius(self.celsius())
    }
}

impl From<i32> for Temperature {
    fn from(celsius: i32) -> Self {
        Self(Number::from(celsius))
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Feature properties carried by a reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProperties {
    pub temperature: Temperature,
}

/// A device position plus temperature sample, as a GeoJSON Feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub geometry: Geometry,
    pub properties: ReadingProperties,
}

impl LocationReading {
    pub fn new(latitude: f64, longitude: f64, temperature: i32) -> Self {
        Self::from_parts(
            Geometry::Point {
                coordinates: Coordinates::new(latitude, longitude),
            },
            ReadingProperties {
                temperature: Temperature::from(temperature),
            },
        )
    }

    pub fn from_parts(geometry: Geometry, properties: ReadingProperties) -> Self {
        Self {
            kind: FeatureType::Feature,
            geometry,
            properties,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        match self.geometry {
            Geometry::Point { coordinates } => coordinates,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates().latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates().longitude
    }

    pub fn temperature(&self) -> &Temperature {
        &self.properties.temperature
    }

    pub fn band(&self) -> TemperatureBand {
        self.properties.temperature.band()
    }

    /// Compact JSON text as published on the topic
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

/// Display classification of a temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureBand {
    /// Below 10°C
    Cold,
    /// From 10°C up to (not including) 30°C
    Mild,
    /// 30°C and above
    Hot,
}

impl TemperatureBand {
    pub fn all() -> Vec<TemperatureBand> {
        vec![
            TemperatureBand::Cold,
            TemperatureBand::Mild,
            TemperatureBand::Hot,
        ]
    }

    pub fn from_celsius(celsius: f64) -> Self {
        if celsius >= HOT_FROM_CELSIUS {
            TemperatureBand::Hot
        } else if celsius >= MILD_FROM_CELSIUS {
            TemperatureBand::Mild
        } else {
            TemperatureBand::Cold
        }
    }

    /// Colour name used for the marker label
    pub fn color_name(&self) -> &'static str {
        match self {
            TemperatureBand::Cold => "blue",
            TemperatureBand::Mild => "green",
            TemperatureBand::Hot => "red",
        }
    }
}
