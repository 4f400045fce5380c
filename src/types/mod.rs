use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub mod wire;

pub use wire::{GpsBatch, GpsData};

/// Raw position report from the platform location subsystem.
///
/// Speeds are m/s, distances meters, angles degrees. Negative accuracy or
/// speed values mean "unknown" (platform convention).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default = "unknown")]
    pub vertical_accuracy: f64,
    #[serde(default)]
    pub floor: Option<i32>,
    #[serde(default = "unknown")]
    pub heading: f64,
    #[serde(default = "unknown")]
    pub heading_accuracy: f64,
    #[serde(default = "unknown")]
    pub speed: f64,
    #[serde(default = "unknown")]
    pub speed_accuracy: f64,
}

fn unknown() -> f64 {
    -1.0
}

impl Fix {
    /// Minimal fix with only position, accuracy and speed set
    pub fn new(timestamp: f64, latitude: f64, longitude: f64, horizontal_accuracy: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            horizontal_accuracy,
            altitude: 0.0,
            vertical_accuracy: -1.0,
            floor: None,
            heading: -1.0,
            heading_accuracy: -1.0,
            speed: -1.0,
            speed_accuracy: -1.0,
        }
    }

    pub fn with_speed(mut self, speed_ms: f64) -> Self {
        self.speed = speed_ms;
        self
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed * 3.6
    }

    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        distance_m(self.latitude, self.longitude, latitude, longitude)
    }
}

/// Canonical accepted fix, as buffered, persisted and uploaded.
///
/// Two records are the same point only when timestamp, latitude and
/// longitude all match; ordering looks at the timestamp alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionRecord {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub altitude: f64,
    pub vertical_accuracy: f64,
    pub floor: i32,
    pub heading: f64,
    pub heading_accuracy: f64,
    pub speed: f64,
    pub speed_accuracy: f64,
}

impl PositionRecord {
    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        distance_m(self.latitude, self.longitude, latitude, longitude)
    }
}

impl From<&Fix> for PositionRecord {
    fn from(fix: &Fix) -> Self {
        PositionRecord {
            timestamp: fix.timestamp,
            latitude: fix.latitude,
            longitude: fix.longitude,
            horizontal_accuracy: fix.horizontal_accuracy,
            altitude: fix.altitude,
            vertical_accuracy: fix.vertical_accuracy,
            floor: fix.floor.unwrap_or(0),
            heading: fix.heading,
            heading_accuracy: fix.heading_accuracy,
            speed: fix.speed,
            speed_accuracy: fix.speed_accuracy,
        }
    }
}

impl PartialEq for PositionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.latitude == other.latitude
            && self.longitude == other.longitude
    }
}

impl PartialOrd for PositionRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.timestamp.partial_cmp(&other.timestamp)
    }
}

/// Place visit reported by the platform. `departure` is `None` while the
/// device is still at the place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Visit {
    pub latitude: f64,
    pub longitude: f64,
    pub arrival: Option<f64>,
    pub departure: Option<f64>,
}

impl Visit {
    pub fn is_departure(&self) -> bool {
        self.departure.is_some()
    }
}

/// Great-circle distance in meters
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}
