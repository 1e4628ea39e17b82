//! Terminal MQTT client that shares the device position and a temperature
//! reading as GeoJSON, and shows readings received on the same topic as a
//! map marker.

pub mod bridge;
pub mod console;
pub mod controller;
pub mod events;
pub mod geolocation;
pub mod map;
pub mod message_log;
pub mod runner;
pub mod session;
pub mod settings;
pub mod station;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use bridge::{LocationBridge, TemperatureSensor};
pub use controller::{ConnectTuning, ConnectionController, ConnectionForm};
pub use events::{AppEvent, Effect, PositionPurpose};
pub use geolocation::{LocationProvider, Position};
pub use map::{MapView, TerminalMap};
pub use message_log::MessageLog;
pub use runner::Runner;
pub use session::{ConnectionState, SessionState};
pub use settings::ClientSettings;
pub use station::Station;
pub use transport::{MqttTransport, Transport};
