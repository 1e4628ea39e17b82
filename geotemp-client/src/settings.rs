//! Client configuration.
//!
//! Layers, lowest priority first: built-in defaults, `geotemp.toml` (or the
//! file given on the command line), `GEOTEMP_*` environment variables. The
//! binary applies its command-line flags on top.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use geotemp_protocol::temperature::{MAX_CELSIUS, MIN_CELSIUS};
use geotemp_protocol::DEFAULT_TOPIC;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

use crate::bridge::{FixedTemperature, RandomTemperature, TemperatureSensor};
use crate::controller::{ConnectTuning, ConnectionForm};
use crate::geolocation::{FileLocation, FixedLocation, GeolocationError, SharedLocationProvider};
use crate::transport::DEFAULT_WS_PATH;

pub const DEFAULT_CONFIG_NAME: &str = "geotemp";
pub const ENV_PREFIX: &str = "GEOTEMP";
pub const DEFAULT_HOST: &str = "broker.hivemq.com";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid fixed location: {0}")]
    Location(#[from] GeolocationError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    /// Random `clientId-<n>` when unset
    pub client_id: Option<String>,
    /// Blank means the default topic is filled in on connect
    pub topic: String,
    pub ws_path: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub geolocation_timeout_secs: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_file: Option<PathBuf>,
    /// Fixed temperature for shares instead of a random one
    pub temperature: Option<i32>,
    /// Connect as soon as the client starts
    pub connect: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: None,
            topic: String::new(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            keep_alive_secs: 60,
            connect_timeout_secs: 30,
            retry_delay_secs: 5,
            geolocation_timeout_secs: 10,
            latitude: None,
            longitude: None,
            location_file: None,
            temperature: None,
            connect: false,
        }
    }
}

impl ClientSettings {
    /// Load from the optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        Self::from_builder(
            Config::builder()
                .add_source(file)
                .add_source(environment()),
        )
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(SettingsError::Invalid("port must be non-zero".into()));
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(SettingsError::Invalid(
                "latitude and longitude must be set together".into(),
            ));
        }
        for (name, secs) in [
            ("keep_alive_secs", self.keep_alive_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("geolocation_timeout_secs", self.geolocation_timeout_secs),
        ] {
            if secs == 0 {
                return Err(SettingsError::Invalid(format!("{} must be positive", name)));
            }
        }
        if let Some(celsius) = self.temperature {
            if !(MIN_CELSIUS..=MAX_CELSIUS).contains(&celsius) {
                return Err(SettingsError::Invalid(format!(
                    "temperature {} outside {}..={} °C",
                    celsius, MIN_CELSIUS, MAX_CELSIUS
                )));
            }
        }
        Ok(())
    }

    pub fn form(&self) -> ConnectionForm {
        ConnectionForm {
            host: self.host.clone(),
            port: self.port,
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(generate_client_id),
            topic: self.topic.clone(),
            message: String::new(),
        }
    }

    pub fn tuning(&self) -> ConnectTuning {
        ConnectTuning {
            path: self.ws_path.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    /// The configured position source. `None` behaves like a device without
    /// geolocation support.
    pub fn location_provider(&self) -> Result<Option<SharedLocationProvider>, SettingsError> {
        if let Some(path) = &self.location_file {
            return Ok(Some(Arc::new(FileLocation::new(path.clone()))));
        }
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                Ok(Some(Arc::new(FixedLocation::new(latitude, longitude)?)))
            }
            _ => Ok(None),
        }
    }

    pub fn sensor(&self) -> Box<dyn TemperatureSensor> {
        match self.temperature {
            Some(celsius) => Box::new(FixedTemperature(celsius)),
            None => Box::new(RandomTemperature),
        }
    }

    pub fn effective_topic(&self) -> &str {
        if self.topic.is_empty() {
            DEFAULT_TOPIC
        } else {
            &self.topic
        }
    }
}

/// `GEOTEMP_*` variables. Values stay strings until a field asks for a
/// number, so ids and topics keep leading zeros.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
}

/// `clientId-` plus a random number in [0, 999]
pub fn generate_client_id() -> String {
    format!("clientId-{}", rand::thread_rng().gen_range(0..1000))
}
