//! Request handlers for the HTTP/JSON + SSE surface (`spec.md` §6).
//!
//! One module per endpoint group, in the teacher's `api::handlers`
//! layout (`status.rs`, `drilling.rs`, … there; `detections.rs`,
//! `analytics.rs`, `live.rs` here).

mod analytics;
mod detections;
mod live;

pub use analytics::{accumulation, beta_diversity, correlation, heatmap};
pub use detections::{count, get_by_id, list, recent, species_summary, taxonomy_families};
pub use live::live_detections;
