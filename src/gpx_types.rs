use std::ops::Index;

use serde::Deserialize;

/// A single coordinate read from a waypoint file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Which GPX points make up a generator's waypoint sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaypointFileType {
    /// `<wpt>` elements in document order.
    #[default]
    Gpx,
    /// Every `<rtept>` of every `<rte>`.
    GpxRoute,
    /// Every `<trkpt>` of every `<trkseg>` of every `<trk>`.
    GpxTrack,
}

impl WaypointFileType {
    /// Local name of the point element this file type collects.
    pub(crate) fn point_element(self) -> &'static [u8] {
        match self {
            Self::Gpx => b"wpt",
            Self::GpxRoute => b"rtept",
            Self::GpxTrack => b"trkpt",
        }
    }
}

impl std::fmt::Display for WaypointFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpx => write!(f, "gpx"),
            Self::GpxRoute => write!(f, "gpx-route"),
            Self::GpxTrack => write!(f, "gpx-track"),
        }
    }
}

/// Ordered, immutable waypoint sequence owned by one generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaypointSet {
    points: Vec<Waypoint>,
}

impl WaypointSet {
    pub fn new(points: Vec<Waypoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.points.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.points.iter()
    }
}

impl Index<usize> for WaypointSet {
    type Output = Waypoint;

    fn index(&self, index: usize) -> &Waypoint {
        &self.points[index]
    }
}

impl From<Vec<Waypoint>> for WaypointSet {
    fn from(points: Vec<Waypoint>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<(f64, f64)> for WaypointSet {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(lat, lon)| Waypoint::new(lat, lon)).collect())
    }
}
