//! SSE adapter (`spec.md` §4.3 "wraps each detection in an SSE frame;
//! sends heartbeats every few seconds when idle").
//!
//! The actual `axum::response::sse::Sse` stream lives in the web daemon's
//! HTTP layer (it needs `axum` types this module has no business knowing
//! about); what belongs here is the wire shape and the heartbeat cadence,
//! shared by both the live-detections stream and the update-progress
//! stream.

use std::time::Duration;

use serde::Serialize;

use crate::types::Detection;

/// How often a heartbeat comment frame is sent on an otherwise-idle SSE
/// connection.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Serialize)]
pub struct DetectionFrame {
    pub id: String,
    pub scientific_name: String,
    pub common_name: String,
    pub confidence: f64,
    pub timestamp: String,
}

impl From<&Detection> for DetectionFrame {
    fn from(d: &Detection) -> Self {
        Self {
            id: d.id.to_string(),
            scientific_name: d.scientific_name.clone(),
            common_name: d.common_name.clone(),
            confidence: d.confidence,
            timestamp: d.timestamp.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewDetection;
    use chrono::Utc;

    #[test]
    fn detection_frame_serializes_to_json() {
        let detection = Detection::new(
            NewDetection {
                scientific_name: "Corvus corax".to_string(),
                common_name: "Common Raven".to_string(),
                confidence: 0.8,
                latitude: None,
                longitude: None,
                species_confidence_threshold: 0.5,
                sensitivity_setting: 1.0,
                overlap: 0.5,
                week: 1,
                audio_file_id: None,
            },
            Utc::now(),
        )
        .unwrap();

        let frame = DetectionFrame::from(&detection);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("Common Raven"));
    }
}
