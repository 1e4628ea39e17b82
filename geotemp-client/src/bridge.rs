//! Location/marker bridge: turns device positions and readings into map updates

use geotemp_protocol::temperature::{MAX_CELSIUS, MIN_CELSIUS};
use geotemp_protocol::LocationReading;
use log::debug;
use rand::Rng;

use crate::events::{Effect, PositionPurpose};
use crate::geolocation::{GeolocationError, Position, SharedLocationProvider};
use crate::map::{LatLng, MapView, Popup, DEFAULT_CENTER, DEFAULT_ZOOM, FOCUS_ZOOM};
use crate::message_log::MessageLog;
use crate::session::SessionState;

pub const GEOLOCATION_UNSUPPORTED: &str = "Geolocation is not supported on this device";

/// Source of the temperature attached to shared readings
pub trait TemperatureSensor: Send {
    fn read_celsius(&mut self) -> i32;
}

/// Uniformly random temperature in the generated range
#[derive(Debug, Default)]
pub struct RandomTemperature;

impl TemperatureSensor for RandomTemperature {
    fn read_celsius(&mut self) -> i32 {
        random_temperature(&mut rand::thread_rng())
    }
}

pub fn random_temperature(rng: &mut impl Rng) -> i32 {
    rng.gen_range(MIN_CELSIUS..=MAX_CELSIUS)
}

/// Constant temperature, for demos and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedTemperature(pub i32);

impl TemperatureSensor for FixedTemperature {
    fn read_celsius(&mut self) -> i32 {
        self.0
    }
}

impl From<Position> for LatLng {
    fn from(position: Position) -> Self {
        LatLng::new(position.latitude, position.longitude)
    }
}

/// Owns the map and the position source. Session handles (marker, watch)
/// live in the [`SessionState`] lent by the controller.
pub struct LocationBridge<M> {
    map: M,
    provider: Option<SharedLocationProvider>,
    sensor: Box<dyn TemperatureSensor>,
}

impl<M: MapView> LocationBridge<M> {
    pub fn new(
        map: M,
        provider: Option<SharedLocationProvider>,
        sensor: Box<dyn TemperatureSensor>,
    ) -> Self {
        Self {
            map,
            provider,
            sensor,
        }
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn provider(&self) -> Option<SharedLocationProvider> {
        self.provider.clone()
    }

    pub fn geolocation_supported(&self) -> bool {
        self.provider.is_some()
    }

    /// Show the fallback view and ask for the device position once
    pub fn initialize(&mut self, log: &mut MessageLog) -> Option<Effect> {
        self.map.set_view(DEFAULT_CENTER, DEFAULT_ZOOM);
        self.position_query(PositionPurpose::InitialView, 0, log)
    }

    /// Called when a session connects: allocate the watch handle and centre
    /// the map on the device once
    pub fn start_watching(&mut self, session: &mut SessionState) -> Option<Effect> {
        let watch = session.allocate_watch();
        debug!("👀 Location watch {:?} started", watch);

        self.provider.as_ref().map(|_| Effect::QueryPosition {
            purpose: PositionPurpose::SessionView,
            generation: session.generation(),
        })
    }

    pub fn stop_watching(&mut self, session: &mut SessionState) {
        if let Some(watch) = session.watch.take() {
            debug!("👀 Location watch {:?} stopped", watch);
        }
    }

    pub fn clear_marker(&mut self, session: &mut SessionState) {
        if let Some(marker) = session.marker.take() {
            self.map.remove_marker(marker);
        }
    }

    pub fn share_current_location(
        &mut self,
        session: &SessionState,
        log: &mut MessageLog,
    ) -> Option<Effect> {
        self.position_query(PositionPurpose::Share, session.generation(), log)
    }

    fn position_query(
        &self,
        purpose: PositionPurpose,
        generation: u64,
        log: &mut MessageLog,
    ) -> Option<Effect> {
        if self.provider.is_none() {
            log.push(GEOLOCATION_UNSUPPORTED);
            return None;
        }
        Some(Effect::QueryPosition {
            purpose,
            generation,
        })
    }

    /// Apply a position query result. For a share, returns the reading the
    /// caller must publish and then render.
    pub fn handle_position(
        &mut self,
        purpose: PositionPurpose,
        generation: u64,
        result: Result<Position, GeolocationError>,
        session: &SessionState,
        log: &mut MessageLog,
    ) -> Option<LocationReading> {
        if purpose != PositionPurpose::InitialView && !session.is_current(generation) {
            debug!(
                "Dropping {:?} position from session {} (now {})",
                purpose,
                generation,
                session.generation()
            );
            return None;
        }

        match (purpose, result) {
            (PositionPurpose::InitialView | PositionPurpose::SessionView, Ok(position)) => {
                self.map.set_view(position.into(), FOCUS_ZOOM);
                None
            }
            (PositionPurpose::InitialView, Err(e)) => {
                log.push(format!("Error getting location: {}", e));
                None
            }
            (PositionPurpose::SessionView, Err(e)) => {
                log.push(format!("Error getting initial location: {}", e));
                None
            }
            (PositionPurpose::Share, Ok(position)) => Some(self.reading_at(position)),
            (PositionPurpose::Share, Err(e)) => {
                log.push(format!("Error getting location: {}", e));
                None
            }
        }
    }

    pub fn reading_at(&mut self, position: Position) -> LocationReading {
        LocationReading::new(
            position.latitude,
            position.longitude,
            self.sensor.read_celsius(),
        )
    }

    /// Replace the marker with one for `reading` and centre on it
    pub fn render_reading(&mut self, session: &mut SessionState, reading: &LocationReading) {
        self.clear_marker(session);

        let position = LatLng::new(reading.latitude(), reading.longitude());
        let marker = self
            .map
            .add_marker(position, Popup::temperature(reading.temperature()));
        session.marker = Some(marker);

        self.map.set_view(position, FOCUS_ZOOM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::FixedLocation;
    use crate::map::TerminalMap;
    use geotemp_protocol::TemperatureBand;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn bridge(with_provider: bool) -> LocationBridge<TerminalMap> {
        let provider: Option<SharedLocationProvider> = if with_provider {
            Some(Arc::new(FixedLocation::new(51.05, -114.07).unwrap()))
        } else {
            None
        };
        LocationBridge::new(TerminalMap::new(), provider, Box::new(FixedTemperature(22)))
    }

    #[test]
    fn test_random_temperature_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(551);
        for _ in 0..1000 {
            let celsius = random_temperature(&mut rng);
            assert!((MIN_CELSIUS..=MAX_CELSIUS).contains(&celsius));
        }
    }

    #[test]
    fn test_initialize_queries_initial_view() {
        let mut bridge = bridge(true);
        let mut log = MessageLog::new();

        let effect = bridge.initialize(&mut log);

        assert_eq!(
            effect,
            Some(Effect::QueryPosition {
                purpose: PositionPurpose::InitialView,
                generation: 0
            })
        );
        assert_eq!(bridge.map().zoom(), DEFAULT_ZOOM);
        assert!(log.is_empty());
    }

    #[test]
    fn test_initialize_without_geolocation() {
        let mut bridge = bridge(false);
        let mut log = MessageLog::new();

        assert_eq!(bridge.initialize(&mut log), None);
        assert_eq!(log.last(), Some(GEOLOCATION_UNSUPPORTED));
    }

    #[test]
    fn test_render_replaces_marker_and_recenters() {
        let mut bridge = bridge(true);
        let mut session = SessionState::new();

        bridge.render_reading(&mut session, &LocationReading::new(51.0, -114.0, 5));
        let first = session.marker.expect("first marker");
        bridge.render_reading(&mut session, &LocationReading::new(52.0, -113.0, 35));
        let second = session.marker.expect("second marker");

        assert_ne!(first, second);
        assert_eq!(bridge.map().marker_count(), 1);
        let marker = bridge.map().marker(second).unwrap();
        assert_eq!(marker.position, LatLng::new(52.0, -113.0));
        assert_eq!(marker.popup.band, TemperatureBand::Hot);
        assert_eq!(bridge.map().center(), LatLng::new(52.0, -113.0));
        assert_eq!(bridge.map().zoom(), FOCUS_ZOOM);
    }

    #[test]
    fn test_session_view_error_is_reported() {
        let mut bridge = bridge(true);
        let mut session = SessionState::new();
        let generation = session.advance_generation();
        let mut log = MessageLog::new();

        let reading = bridge.handle_position(
            PositionPurpose::SessionView,
            generation,
            Err(GeolocationError::PermissionDenied("denied".into())),
            &session,
            &mut log,
        );

        assert!(reading.is_none());
        assert_eq!(
            log.last(),
            Some("Error getting initial location: Permission denied: denied")
        );
    }

    #[test]
    fn test_stale_position_is_dropped() {
        let mut bridge = bridge(true);
        let mut session = SessionState::new();
        let old = session.advance_generation();
        session.advance_generation();
        let mut log = MessageLog::new();

        let reading = bridge.handle_position(
            PositionPurpose::Share,
            old,
            Ok(Position::new(51.05, -114.07)),
            &session,
            &mut log,
        );
        bridge.handle_position(
            PositionPurpose::SessionView,
            old,
            Ok(Position::new(10.0, 10.0)),
            &session,
            &mut log,
        );

        assert!(reading.is_none());
        assert_eq!(bridge.map().center(), DEFAULT_CENTER);
        assert!(log.is_empty());
    }

    #[test]
    fn test_share_position_builds_reading() {
        let mut bridge = bridge(true);
        let mut session = SessionState::new();
        let generation = session.advance_generation();
        let mut log = MessageLog::new();

        assert_eq!(
            bridge.share_current_location(&session, &mut log),
            Some(Effect::QueryPosition {
                purpose: PositionPurpose::Share,
                generation
            })
        );

        let reading = bridge
            .handle_position(
                PositionPurpose::Share,
                generation,
                Ok(Position::new(51.05, -114.07)),
                &session,
                &mut log,
            )
            .expect("reading");

        assert_eq!(
            reading.to_json().unwrap(),
            r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[-114.07,51.05]},"properties":{"temperature":22}}"#
        );
    }
}
