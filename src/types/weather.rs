//! The `Weather` entity (`spec.md` §3), keyed by `(timestamp_hour,
//! latitude, longitude)`. One row may be referenced by many detections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Weather {
    pub timestamp_hour: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub precipitation: Option<f64>,
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub visibility: Option<f64>,
    pub uv_index: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl Weather {
    /// Keying tuple used for lookups and for the `Detection` foreign key.
    pub fn key(&self) -> (DateTime<Utc>, i64, i64) {
        (
            self.timestamp_hour,
            quantize_degrees(self.latitude),
            quantize_degrees(self.longitude),
        )
    }
}

/// Quantizes a lat/lon value to a stable integer key (1e-4 degree
/// resolution, roughly 11 m) so floating point jitter doesn't create
/// spurious duplicate weather rows for the same station reading.
fn quantize_degrees(value: f64) -> i64 {
    (value * 10_000.0).round() as i64
}
