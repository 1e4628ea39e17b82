//! GeoTemp Protocol
//!
//! This crate provides the wire definitions exchanged over MQTT by geotemp
//! clients: a device position plus a temperature sample, encoded as a GeoJSON
//! `Feature` with a `Point` geometry.
//!
//! # Features
//!
//! - **Typed Payloads**: `LocationReading` serializes to the exact compact JSON
//!   other subscribers expect (longitude first, as GeoJSON requires)
//! - **Explicit Parsing**: inbound text becomes a `ParsedPayload`, either a
//!   valid reading or a malformed payload with its reason
//! - **Temperature Bands**: the cold/mild/hot classification used for display
//!
//! # Example
//!
//! ```rust
//! use geotemp_protocol::{LocationReading, ParsedPayload, TemperatureBand};
//!
//! let reading = LocationReading::new(51.05, -114.07, 22);
//! let json = reading.to_json().unwrap();
//! assert_eq!(reading.band(), TemperatureBand::Mild);
//!
//! match ParsedPayload::parse(&json) {
//!     ParsedPayload::ValidReading(parsed) => assert_eq!(parsed, reading),
//!     ParsedPayload::Malformed(reason) => panic!("unexpected: {}", reason),
//! }
//! ```

pub mod payload;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use payload::{MalformedReason, ParsedPayload};
pub use protocol::*;
pub use types::*;

pub use serde_json;
