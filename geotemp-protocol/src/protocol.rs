//! Protocol constants shared by every geotemp client

/// Topic names
pub mod topics {
    /// Topic used for both the subscription and all publishes when the user
    /// leaves the topic blank at connect time
    pub const DEFAULT_TOPIC: &str = "ENGO551/your_name/my_temperature";
}

/// Temperature range produced by simulated sensors, in degrees Celsius
pub mod temperature {
    /// Lowest generated temperature (inclusive)
    pub const MIN_CELSIUS: i32 = -40;
    /// Highest generated temperature (inclusive)
    pub const MAX_CELSIUS: i32 = 60;

    /// Readings below this are shown as cold
    pub const MILD_FROM_CELSIUS: f64 = 10.0;
    /// Readings at or above this are shown as hot
    pub const HOT_FROM_CELSIUS: f64 = 30.0;
}

/// GeoJSON literals used on the wire
pub mod geojson {
    pub const FEATURE: &str = "Feature";
    pub const POINT: &str = "Point";
}

pub use topics::DEFAULT_TOPIC;
