//! The analytics query layer (`spec.md` §4.5 "Analytic algorithms").
//!
//! Each submodule implements one algorithm in isolation, taking plain
//! data (timestamps, species sets, count vectors) rather than touching
//! the store directly, so they can be unit-tested without a database and
//! reused behind the cache layer (`crate::cache`) by the web daemon's
//! handlers.

mod accumulation;
mod beta_diversity;
mod correlation;
mod distribution;
mod heatmap;
mod period;

pub use accumulation::{accumulation_curve, AccumulationMethod, AccumulationPoint};
pub use beta_diversity::{temporal_beta_diversity, TurnoverStep};
pub use correlation::pearson_correlation;
pub use distribution::{stem_and_leaf, StemLeaf};
pub use heatmap::{heatmap, Heatmap, HourlyHeatmap, WeeklyHeatmap};
pub use period::{boundaries, Period};
