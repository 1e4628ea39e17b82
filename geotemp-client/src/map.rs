//! Map view abstraction and the terminal implementation used by the client

use std::collections::BTreeMap;
use std::io::{self, Write};

use crossterm::style::{Color, Stylize};
use geotemp_protocol::{Temperature, TemperatureBand};
use log::warn;

/// Geographic point in map order (latitude first)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Fallback centre used until a device position is known
pub const DEFAULT_CENTER: LatLng = LatLng::new(51.05, -114.07);
pub const DEFAULT_ZOOM: u8 = 13;
/// Zoom used when centring on a device position or a reading
pub const FOCUS_ZOOM: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(u64);

/// Label attached to a marker
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub text: String,
    pub band: TemperatureBand,
}

impl Popup {
    pub fn temperature(temperature: &Temperature) -> Self {
        Self {
            text: format!("Temperature: {}°C", temperature),
            band: temperature.band(),
        }
    }

    /// Popup text with the band colour applied as terminal escape codes
    pub fn styled(&self) -> String {
        self.text
            .as_str()
            .with(band_color(self.band))
            .bold()
            .to_string()
    }
}

pub fn band_color(band: TemperatureBand) -> Color {
    match band {
        TemperatureBand::Cold => Color::Blue,
        TemperatureBand::Mild => Color::Green,
        TemperatureBand::Hot => Color::Red,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: LatLng,
    pub popup: Popup,
}

/// Minimal surface the location bridge needs from a map
pub trait MapView {
    fn set_view(&mut self, center: LatLng, zoom: u8);
    fn add_marker(&mut self, position: LatLng, popup: Popup) -> MarkerId;
    /// Returns false if the marker was already gone
    fn remove_marker(&mut self, id: MarkerId) -> bool;
    fn center(&self) -> LatLng;
    fn zoom(&self) -> u8;
}

/// Map that keeps view and marker state in memory and prints every change
pub struct TerminalMap {
    center: LatLng,
    zoom: u8,
    markers: BTreeMap<MarkerId, Marker>,
    next_marker: u64,
    out: Option<Box<dyn Write + Send>>,
}

impl TerminalMap {
    /// Map without output
    pub fn new() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            markers: BTreeMap::new(),
            next_marker: 1,
            out: None,
        }
    }

    pub fn stdout() -> Self {
        Self {
            out: Some(Box::new(io::stdout())),
            ..Self::new()
        }
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    fn print(&mut self, line: String) {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                warn!("Failed to draw map update: {}", e);
            }
        }
    }
}

impl Default for TerminalMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapView for TerminalMap {
    fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.center = center;
        self.zoom = zoom;
        self.print(format!(
            "🗺️  View {:.5}, {:.5} (zoom {}) {}",
            center.latitude,
            center.longitude,
            zoom,
            osm_link(center, zoom)
        ));
    }

    fn add_marker(&mut self, position: LatLng, popup: Popup) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;

        self.print(format!(
            "📍 Marker at {:.5}, {:.5}: {}",
            position.latitude,
            position.longitude,
            popup.styled()
        ));
        self.markers.insert(id, Marker { position, popup });
        id
    }

    fn remove_marker(&mut self, id: MarkerId) -> bool {
        self.markers.remove(&id).is_some()
    }

    fn center(&self) -> LatLng {
        self.center
    }

    fn zoom(&self) -> u8 {
        self.zoom
    }
}

/// OpenStreetMap link for a view, clickable from most terminals
pub fn osm_link(center: LatLng, zoom: u8) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat:.5}&mlon={lon:.5}#map={zoom}/{lat:.5}/{lon:.5}",
        lat = center.latitude,
        lon = center.longitude,
        zoom = zoom
    )
}
