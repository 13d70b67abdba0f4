//! The `Detection` entity (`spec.md` §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single model-emitted species identification within one analysis
/// window that cleared the configured confidence threshold.
///
/// Immutable once inserted except for the weather foreign-key triple,
/// which may be filled in exactly once (see [`Detection::attach_weather`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub scientific_name: String,
    pub common_name: String,
    /// Canonicalised `"<scientific>_<common>"` label emitted by the model.
    pub species_tensor: String,
    pub confidence: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub species_confidence_threshold: f64,
    pub sensitivity_setting: f64,
    pub overlap: f64,
    pub week: u8,
    pub weather_timestamp: Option<DateTime<Utc>>,
    pub weather_latitude: Option<f64>,
    pub weather_longitude: Option<f64>,
    pub audio_file_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("week {0} is outside [1, 48]")]
    WeekOutOfRange(u8),
    #[error("weather attachment attempted on a detection that already has one")]
    WeatherAlreadyAttached,
}

/// Fields required to construct a new `Detection` at insert time; `id` and
/// `timestamp` are assigned by [`Detection::new`] rather than supplied by
/// the caller, matching the "generated at insert time" rule in `spec.md`.
pub struct NewDetection {
    pub scientific_name: String,
    pub common_name: String,
    pub confidence: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub species_confidence_threshold: f64,
    pub sensitivity_setting: f64,
    pub overlap: f64,
    pub week: u8,
    pub audio_file_id: Option<Uuid>,
}

impl Detection {
    pub fn new(fields: NewDetection, window_start: DateTime<Utc>) -> Result<Self, DetectionError> {
        if !(0.0..=1.0).contains(&fields.confidence) {
            return Err(DetectionError::ConfidenceOutOfRange(fields.confidence));
        }
        if !(1..=48).contains(&fields.week) {
            return Err(DetectionError::WeekOutOfRange(fields.week));
        }

        let species_tensor = format!("{}_{}", fields.scientific_name, fields.common_name);

        Ok(Self {
            id: Uuid::new_v4(),
            timestamp: window_start,
            scientific_name: fields.scientific_name,
            common_name: fields.common_name,
            species_tensor,
            confidence: fields.confidence,
            latitude: fields.latitude,
            longitude: fields.longitude,
            species_confidence_threshold: fields.species_confidence_threshold,
            sensitivity_setting: fields.sensitivity_setting,
            overlap: fields.overlap,
            week: fields.week,
            weather_timestamp: None,
            weather_latitude: None,
            weather_longitude: None,
            audio_file_id: fields.audio_file_id,
        })
    }

    /// Fills in the weather foreign-key triple. Only ever called once per
    /// detection; a second call is a bug in the caller, not a normal path.
    pub fn attach_weather(
        &mut self,
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), DetectionError> {
        if self.weather_timestamp.is_some() {
            return Err(DetectionError::WeatherAlreadyAttached);
        }
        self.weather_timestamp = Some(timestamp);
        self.weather_latitude = Some(latitude);
        self.weather_longitude = Some(longitude);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_fields() -> NewDetection {
        NewDetection {
            scientific_name: "Turdus migratorius".to_string(),
            common_name: "American Robin".to_string(),
            confidence: 0.95,
            latitude: Some(40.0),
            longitude: Some(-74.0),
            species_confidence_threshold: 0.5,
            sensitivity_setting: 1.0,
            overlap: 0.5,
            week: 20,
            audio_file_id: None,
        }
    }

    #[test]
    fn new_detection_builds_species_tensor() {
        let d = Detection::new(base_fields(), Utc::now()).unwrap();
        assert_eq!(d.species_tensor, "Turdus migratorius_American Robin");
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let mut fields = base_fields();
        fields.confidence = 1.5;
        assert!(matches!(
            Detection::new(fields, Utc::now()),
            Err(DetectionError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn week_out_of_range_is_rejected() {
        let mut fields = base_fields();
        fields.week = 0;
        assert!(matches!(
            Detection::new(fields, Utc::now()),
            Err(DetectionError::WeekOutOfRange(_))
        ));
    }

    #[test]
    fn weather_can_only_be_attached_once() {
        let mut d = Detection::new(base_fields(), Utc::now()).unwrap();
        d.attach_weather(Utc::now(), 40.0, -74.0).unwrap();
        assert!(matches!(
            d.attach_weather(Utc::now(), 40.0, -74.0),
            Err(DetectionError::WeatherAlreadyAttached)
        ));
    }
}
