//! The analysis daemon (`spec.md` §4.2): converts the continuous PCM
//! stream read from the analysis FIFO into zero or more `Detection`
//! records.
//!
//! `Detector` is the single encapsulated value the spec's §9 redesign
//! flag ("Mutable global singletons (interpreter, classes list, metadata
//! cache)") asks for: the interpreter, the label list, and the optional
//! region-filter cache all live here, constructed once at startup and
//! held by the daemon loop — no mutable module-level state.

mod inference;
mod labels;
mod metadata;
mod privacy;
mod region_filter;
mod window;

pub use inference::{InferenceError, Interpreter, OrtInterpreter};
pub use labels::{load_labels, split_label, LabelsError};
pub use metadata::{birdnet_week, convert_metadata, custom_sigmoid};
pub use privacy::{privacy_truncate, Prediction};
pub use region_filter::{OrtMetadataRegionFilter, RegionFilterCache, RegionPlausibility};
pub use window::{Window, Windower, MIN_WINDOW_SECONDS, WINDOW_SECONDS};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::eventbus::EventBus;
use crate::store::{AudioFileStore, DetectionStore};
use crate::types::{AudioFile, Detection, DetectionError, NewDetection};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Labels(#[from] LabelsError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Parameters held constant for the life of the daemon process (as
/// opposed to per-detection fields computed per window).
pub struct DetectorParams {
    pub latitude: f64,
    pub longitude: f64,
    pub week: Option<u8>,
    pub species_confidence_threshold: f64,
    pub sensitivity_setting: f64,
    pub privacy_threshold_percent: f64,
    pub overlap_seconds: f64,
}

/// The analysis daemon's core value: owns the interpreter and the label
/// list, and optionally a region-filter cache. `process_window` is the
/// single per-window entry point; everything downstream of framing goes
/// through it.
pub struct Detector<I: Interpreter, R: RegionPlausibility> {
    interpreter: I,
    labels: Vec<String>,
    region_filter: Option<RegionFilterCache<R>>,
    params: DetectorParams,
}

/// One species prediction that cleared post-filtering, ready to become a
/// `Detection`.
pub struct ScoredPrediction {
    pub scientific_name: String,
    pub common_name: String,
    pub confidence: f64,
}

impl<I: Interpreter, R: RegionPlausibility> Detector<I, R> {
    pub fn new(
        interpreter: I,
        labels: Vec<String>,
        region_filter: Option<RegionFilterCache<R>>,
        params: DetectorParams,
    ) -> Self {
        Self {
            interpreter,
            labels,
            region_filter,
            params,
        }
    }

    /// Runs one window through inference, the custom sigmoid, privacy
    /// truncation, optional region-aware filtering, and the confidence
    /// threshold, in that order (`spec.md` §4.2). Region filtering runs
    /// *before* the threshold test per the spec's "discarded ... before
    /// the threshold test" ordering.
    pub fn process_window(&mut self, window: &Window) -> Result<Vec<ScoredPrediction>, AnalysisError> {
        let metadata = convert_metadata(self.params.latitude, self.params.longitude, self.params.week);
        let logits = self.interpreter.infer(&window.samples, metadata)?;

        let raw_predictions: Vec<Prediction> = logits
            .iter()
            .enumerate()
            .map(|(label_index, &logit)| Prediction {
                label_index,
                score: custom_sigmoid(f64::from(logit), self.params.sensitivity_setting),
            })
            .collect();

        let truncated = privacy_truncate(raw_predictions, self.params.privacy_threshold_percent);

        let mut out = Vec::new();
        for prediction in truncated {
            let Some(label) = self.labels.get(prediction.label_index) else {
                continue;
            };

            if let Some(region_filter) = &mut self.region_filter {
                if !region_filter.allows(self.params.latitude, self.params.longitude, self.params.week, label) {
                    continue;
                }
            }

            if prediction.score < self.params.species_confidence_threshold {
                continue;
            }

            let (scientific_name, common_name) = split_label(label);
            out.push(ScoredPrediction {
                scientific_name,
                common_name,
                confidence: prediction.score,
            });
        }

        Ok(out)
    }

    /// Builds the `Detection` records for one window's surviving
    /// predictions (`spec.md` §8 E1), without touching the store or bus —
    /// callers decide persistence and publication order.
    pub fn to_detections(
        &self,
        predictions: Vec<ScoredPrediction>,
        window_start: DateTime<Utc>,
        audio_file_id: Option<Uuid>,
    ) -> Result<Vec<Detection>, DetectionError> {
        predictions
            .into_iter()
            .map(|p| {
                Detection::new(
                    NewDetection {
                        scientific_name: p.scientific_name,
                        common_name: p.common_name,
                        confidence: p.confidence,
                        latitude: Some(self.params.latitude),
                        longitude: Some(self.params.longitude),
                        species_confidence_threshold: self.params.species_confidence_threshold,
                        sensitivity_setting: self.params.sensitivity_setting,
                        overlap: self.params.overlap_seconds,
                        week: self.params.week.unwrap_or(1),
                        audio_file_id,
                    },
                    window_start,
                )
            })
            .collect()
    }
}

/// Persists a freshly-built detection and publishes it on the event bus,
/// in that order (`spec.md` §4.2 "The store insert and the bus publish
/// occur in that order; the bus publish is fire-and-forget"). A store
/// error is logged and the detection dropped, incrementing a counter —
/// no retry queue, per the spec's explicit non-goal.
pub async fn persist_and_publish(
    store: &DetectionStore<'_>,
    bus: &EventBus,
    detection: Detection,
    dropped_counter: &std::sync::atomic::AtomicU64,
) {
    match store.insert(&detection).await {
        Ok(()) => bus.publish(detection),
        Err(e) => {
            dropped_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::error!(
                error = %e,
                species = %detection.species_tensor,
                "failed to persist detection, dropping it"
            );
        }
    }
}

/// Persists the captured-audio file for a window, if on-disk capture is
/// enabled, returning its id for the `Detection::audio_file_id` FK.
pub async fn persist_audio_file(
    audio_store: &AudioFileStore<'_>,
    file_path: PathBuf,
    duration_seconds: f64,
    size_bytes: u64,
) -> Option<Uuid> {
    let audio = AudioFile::new(file_path.to_string_lossy().into_owned(), duration_seconds, size_bytes);
    let id = audio.id;
    match audio_store.insert(&audio).await {
        Ok(()) => Some(id),
        Err(e) => {
            tracing::error!(error = %e, "failed to persist audio file, detection will have no audio_file_id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FakeInterpreter {
        scores: Vec<f32>,
    }

    impl Interpreter for FakeInterpreter {
        fn infer(&mut self, _audio_window: &[f32], _metadata: [f32; 6]) -> Result<Vec<f32>, InferenceError> {
            Ok(self.scores.clone())
        }
    }

    struct AllowAll;
    impl RegionPlausibility for AllowAll {
        fn plausible_species(&self, _lat: f64, _lon: f64, _week: Option<u8>) -> HashSet<String> {
            HashSet::new()
        }
    }

    fn base_params() -> DetectorParams {
        DetectorParams {
            latitude: 40.0,
            longitude: -74.0,
            week: Some(20),
            species_confidence_threshold: 0.5,
            sensitivity_setting: 1.0,
            privacy_threshold_percent: 100.0,
            overlap_seconds: 0.5,
        }
    }

    #[test]
    fn happy_path_emits_a_single_high_confidence_detection() {
        // logit chosen so sigmoid(logit, s=1.0) ~= 0.95
        let logit = (0.95_f64 / 0.05_f64).ln() as f32;
        let interpreter = FakeInterpreter {
            scores: vec![logit],
        };
        let labels = vec!["Turdus migratorius_American Robin".to_string()];

        let mut detector: Detector<FakeInterpreter, AllowAll> =
            Detector::new(interpreter, labels, None, base_params());

        let window = Window {
            samples: vec![0.0; 100],
            start: Utc::now(),
        };
        let predictions = detector.process_window(&window).unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].scientific_name, "Turdus migratorius");
        assert!((predictions[0].confidence - 0.95).abs() < 1e-2);
    }

    #[test]
    fn below_threshold_predictions_are_dropped() {
        let interpreter = FakeInterpreter { scores: vec![-10.0] };
        let labels = vec!["Corvus corax_Common Raven".to_string()];
        let mut detector: Detector<FakeInterpreter, AllowAll> =
            Detector::new(interpreter, labels, None, base_params());

        let window = Window {
            samples: vec![0.0; 100],
            start: Utc::now(),
        };
        assert!(detector.process_window(&window).unwrap().is_empty());
    }
}
