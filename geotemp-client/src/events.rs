use std::time::Duration;

use crate::geolocation::{GeolocationError, Position};
use crate::transport::SessionEvent;

/// Why a position query was issued; decides what its result does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionPurpose {
    /// Centre the map at startup, independent of any session
    InitialView,
    /// Centre the map once a session connects
    SessionView,
    /// Publish a reading at the current position
    Share,
}

/// Asynchronous work requested by the controller or the bridge. The runner
/// performs it and feeds the outcome back as an [`AppEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    QueryPosition {
        purpose: PositionPurpose,
        generation: u64,
    },
    ScheduleRetry {
        generation: u64,
        delay: Duration,
    },
}

/// Everything the controller task reacts to
#[derive(Debug)]
pub enum AppEvent {
    /// One line typed on the console
    Input(String),
    Transport(SessionEvent),
    Position {
        purpose: PositionPurpose,
        generation: u64,
        result: Result<Position, GeolocationError>,
    },
    RetryDue {
        generation: u64,
    },
    Shutdown,
}
