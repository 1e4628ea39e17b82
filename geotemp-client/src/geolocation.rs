//! Device position sources

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("Timeout expired after {0:?}")]
    Timeout(Duration),
}

/// One-shot position source. Implementations may block; callers run them on
/// the blocking pool through [`query_position`].
pub trait LocationProvider: Send + Sync {
    fn current_position(&self) -> Result<Position, GeolocationError>;
}

pub type SharedLocationProvider = Arc<dyn LocationProvider>;

/// Always reports the configured coordinates
#[derive(Debug, Clone)]
pub struct FixedLocation {
    position: Position,
}

impl FixedLocation {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeolocationError> {
        let position = validate(Position::new(latitude, longitude))?;
        Ok(Self { position })
    }
}

impl LocationProvider for FixedLocation {
    fn current_position(&self) -> Result<Position, GeolocationError> {
        Ok(self.position)
    }
}

/// Reads the position from a file on every query, so an external GPS daemon
/// or script can keep it current. Accepts `lat,lon` or a JSON object with
/// `latitude`/`longitude` (or `lat`/`lon`).
#[derive(Debug, Clone)]
pub struct FileLocation {
    path: PathBuf,
}

impl FileLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocationProvider for FileLocation {
    fn current_position(&self) -> Result<Position, GeolocationError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                GeolocationError::PermissionDenied(format!("{}: {}", self.path.display(), e))
            }
            _ => GeolocationError::PositionUnavailable(format!("{}: {}", self.path.display(), e)),
        })?;

        debug!("📍 Read position from {}", self.path.display());
        parse_position(&text)
    }
}

pub fn parse_position(text: &str) -> Result<Position, GeolocationError> {
    let text = text.trim();

    let position = if text.starts_with('{') {
        serde_json::from_str::<Position>(text)
            .map_err(|e| GeolocationError::PositionUnavailable(format!("bad position JSON: {}", e)))?
    } else {
        let mut parts = text.split(',').map(str::trim);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lat), Some(lon), None) => {
                let latitude = parse_component(lat)?;
                let longitude = parse_component(lon)?;
                Position::new(latitude, longitude)
            }
            _ => {
                return Err(GeolocationError::PositionUnavailable(format!(
                    "expected 'lat,lon', got '{}'",
                    text
                )))
            }
        }
    };

    validate(position)
}

fn parse_component(value: &str) -> Result<f64, GeolocationError> {
    value.parse::<f64>().map_err(|_| {
        GeolocationError::PositionUnavailable(format!("'{}' is not a coordinate", value))
    })
}

fn validate(position: Position) -> Result<Position, GeolocationError> {
    if !(-90.0..=90.0).contains(&position.latitude) {
        return Err(GeolocationError::PositionUnavailable(format!(
            "latitude {} out of range",
            position.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&position.longitude) {
        return Err(GeolocationError::PositionUnavailable(format!(
            "longitude {} out of range",
            position.longitude
        )));
    }
    Ok(position)
}

/// Run one position query off the controller task, bounded by `timeout`
pub async fn query_position(
    provider: SharedLocationProvider,
    timeout: Duration,
) -> Result<Position, GeolocationError> {
    let query = tokio::task::spawn_blocking(move || provider.current_position());

    match tokio::time::timeout(timeout, query).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(GeolocationError::PositionUnavailable(format!(
            "location query failed: {}",
            e
        ))),
        Err(_) => Err(GeolocationError::Timeout(timeout)),
    }
}
