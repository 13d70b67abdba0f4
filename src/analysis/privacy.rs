//! Privacy truncation (`spec.md` §4.2, §8 E2, §9 open question).
//!
//! Keeps only the top `max(10, floor(n * privacy_threshold_percent / 100))`
//! ranked predictions; the rest are discarded outright, not merely scored
//! down. Per `spec.md` §9's resolution of the original's ambiguous
//! behaviour, a label outside the kept slice (notably one containing
//! `"Human"`) is suppressed — it is dropped from the list entirely rather
//! than retained with its score zeroed.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label_index: usize,
    pub score: f64,
}

/// Sorts `predictions` descending by score and truncates to the privacy
/// slice. `predictions` is consumed and a new, truncated `Vec` returned.
pub fn privacy_truncate(mut predictions: Vec<Prediction>, privacy_threshold_percent: f64) -> Vec<Prediction> {
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));

    let n = predictions.len();
    let scaled = (n as f64 * privacy_threshold_percent / 100.0).floor() as usize;
    let keep = scaled.max(10).min(n);

    predictions.truncate(keep);
    predictions
}
