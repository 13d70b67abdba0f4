//! Optional region-aware filtering (`spec.md` §4.2 "Optional region-aware
//! filtering", GLOSSARY "Region-aware filtering").
//!
//! When a metadata model is configured, predictions for species judged
//! implausible at the current `(lat, lon, week)` are discarded before the
//! confidence threshold test. The set of plausible species is cached and
//! only recomputed when any of the three inputs change, since the
//! metadata-model inference that produces it is itself a full forward
//! pass and not worth repeating every window.

use std::collections::HashSet;
use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::warn;

use super::metadata::convert_metadata;

/// Cache key: the three inputs the plausible-species set depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheInputs {
    latitude: f64,
    longitude: f64,
    week: Option<u8>,
}

/// Computes the plausible-species set for a `(lat, lon, week)` triple.
/// In production this runs the metadata-model forward pass; it is
/// injected as a trait so tests (and the non-metadata-model-configured
/// path) don't need `ort` in scope.
pub trait RegionPlausibility {
    fn plausible_species(&self, latitude: f64, longitude: f64, week: Option<u8>) -> HashSet<String>;
}

/// Caches the last-computed plausible-species set, recomputing only when
/// `(lat, lon, week)` changes from the previous call.
pub struct RegionFilterCache<P: RegionPlausibility> {
    plausibility: P,
    last_inputs: Option<CacheInputs>,
    plausible: HashSet<String>,
}

impl<P: RegionPlausibility> RegionFilterCache<P> {
    pub fn new(plausibility: P) -> Self {
        Self {
            plausibility,
            last_inputs: None,
            plausible: HashSet::new(),
        }
    }

    /// Returns `true` if `species_tensor` should survive the region
    /// filter (i.e. is absent-from-cache predictions are the ones
    /// discarded, per the spec's "predictions for species absent from the
    /// cache are discarded").
    pub fn allows(&mut self, latitude: f64, longitude: f64, week: Option<u8>, species_tensor: &str) -> bool {
        let inputs = CacheInputs { latitude, longitude, week };
        if self.last_inputs != Some(inputs) {
            self.plausible = self.plausibility.plausible_species(latitude, longitude, week);
            self.last_inputs = Some(inputs);
        }
        self.plausible.contains(species_tensor)
    }
}

/// Below this score the metadata model considers a species implausible at
/// the queried `(lat, lon, week)`. Matches the species-presence threshold
/// BirdNET-Pi's metadata ("mdata") model ships with.
const PLAUSIBILITY_THRESHOLD: f64 = 0.03;

/// `ort`-backed `RegionPlausibility`: a forward pass of the separately
/// trained metadata-only model, which takes the same 6-element encoded
/// `(lat, lon, week)` vector as the main model's metadata input and
/// returns one presence score per label.
///
/// Labels are expected in the same `"{scientific}_{common}"` form
/// `labels::load_labels` produces, so the returned set can be compared
/// directly against `ScoredPrediction::scientific_name`/`species_tensor`.
pub struct OrtMetadataRegionFilter {
    session: std::cell::RefCell<Session>,
    labels: Vec<String>,
}

impl OrtMetadataRegionFilter {
    pub fn load(model_path: &Path, labels: Vec<String>) -> Result<Self, super::inference::InferenceError> {
        use super::inference::InferenceError;

        let session = Session::builder()
            .map_err(|e| InferenceError::Session(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::Session(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| InferenceError::Session(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| InferenceError::Session(e.to_string()))?;

        Ok(Self {
            session: std::cell::RefCell::new(session),
            labels,
        })
    }
}

impl RegionPlausibility for OrtMetadataRegionFilter {
    /// Fails open: a model run that errors or returns a mismatched-length
    /// tensor yields every label as plausible, so a broken metadata model
    /// degrades to "no region filtering" rather than silently discarding
    /// every detection.
    fn plausible_species(&self, latitude: f64, longitude: f64, week: Option<u8>) -> HashSet<String> {
        let metadata = convert_metadata(latitude, longitude, week);
        let metadata_tensor: ndarray::Array2<f32> =
            ndarray::Array1::from_vec(metadata.to_vec()).insert_axis(ndarray::Axis(0));

        let scores = match self
            .session
            .borrow_mut()
            .run(ort::inputs!["metadata" => metadata_tensor.view()])
            .and_then(|outputs| outputs[0].try_extract_tensor::<f32>().map(|(_, s)| s.to_vec()))
        {
            Ok(scores) => scores,
            Err(err) => {
                warn!(error = %err, "metadata model run failed, disabling region filter for this window");
                return self.labels.iter().cloned().collect();
            }
        };

        if scores.len() != self.labels.len() {
            warn!(
                expected = self.labels.len(),
                actual = scores.len(),
                "metadata model output length mismatch, disabling region filter for this window"
            );
            return self.labels.iter().cloned().collect();
        }

        self.labels
            .iter()
            .zip(scores)
            .filter(|(_, score)| f64::from(*score) >= PLAUSIBILITY_THRESHOLD)
            .map(|(label, _)| label.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingPlausibility {
        calls: Rc<Cell<u32>>,
        species: HashSet<String>,
    }

    impl RegionPlausibility for CountingPlausibility {
        fn plausible_species(&self, _lat: f64, _lon: f64, _week: Option<u8>) -> HashSet<String> {
            self.calls.set(self.calls.get() + 1);
            self.species.clone()
        }
    }

    #[test]
    fn recomputes_only_when_inputs_change() {
        let calls = Rc::new(Cell::new(0));
        let mut species = HashSet::new();
        species.insert("Turdus migratorius_American Robin".to_string());

        let mut cache = RegionFilterCache::new(CountingPlausibility {
            calls: calls.clone(),
            species,
        });

        assert!(cache.allows(40.0, -74.0, Some(20), "Turdus migratorius_American Robin"));
        assert!(cache.allows(40.0, -74.0, Some(20), "Turdus migratorius_American Robin"));
        assert_eq!(calls.get(), 1);

        cache.allows(41.0, -74.0, Some(20), "Turdus migratorius_American Robin");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn species_absent_from_the_cache_is_disallowed() {
        let calls = Rc::new(Cell::new(0));
        let mut cache = RegionFilterCache::new(CountingPlausibility {
            calls,
            species: HashSet::new(),
        });

        assert!(!cache.allows(40.0, -74.0, Some(20), "Corvus corax_Common Raven"));
    }
}
