//! Temporal β-diversity (`spec.md` §4.5, GLOSSARY "β-diversity").

use std::collections::HashSet;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnoverStep {
    pub species_lost: usize,
    pub species_gained: usize,
    pub turnover_rate: f64,
}

/// Slides a window of size `window_size` over `windows` (each already the
/// caller's species set for one time bucket, in chronological order) and
/// emits one [`TurnoverStep`] per consecutive pair.
///
/// `window_size` is accepted for API symmetry with the spec's "sliding
/// window of size W" framing; the windows themselves are pre-bucketed by
/// the caller (e.g. one `HashSet` per day), so this operates on
/// consecutive pairs directly rather than re-deriving windows from a flat
/// timestamp stream.
pub fn temporal_beta_diversity(windows: &[HashSet<String>]) -> Vec<TurnoverStep> {
    windows
        .windows(2)
        .map(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            let lost = previous.difference(current).count();
            let gained = current.difference(previous).count();
            let union = previous.union(current).count();

            let turnover_rate = if union == 0 {
                0.0
            } else {
                (lost + gained) as f64 / (2.0 * union as f64)
            };

            TurnoverStep {
                species_lost: lost,
                species_gained: gained,
                turnover_rate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(species: &[&str]) -> HashSet<String> {
        species.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_windows_have_zero_turnover() {
        let windows = vec![set(&["a", "b"]), set(&["a", "b"])];
        let steps = temporal_beta_diversity(&windows);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].species_lost, 0);
        assert_eq!(steps[0].species_gained, 0);
        assert_eq!(steps[0].turnover_rate, 0.0);
    }

    #[test]
    fn complete_turnover_has_rate_one() {
        let windows = vec![set(&["a", "b"]), set(&["c", "d"])];
        let steps = temporal_beta_diversity(&windows);
        assert_eq!(steps[0].species_lost, 2);
        assert_eq!(steps[0].species_gained, 2);
        assert_eq!(steps[0].turnover_rate, 1.0);
    }

    #[test]
    fn partial_turnover_matches_the_formula() {
        let windows = vec![set(&["a", "b", "c"]), set(&["b", "c", "d"])];
        let steps = temporal_beta_diversity(&windows);
        // lost = {a} = 1, gained = {d} = 1, union = {a,b,c,d} = 4
        assert_eq!(steps[0].species_lost, 1);
        assert_eq!(steps[0].species_gained, 1);
        assert!((steps[0].turnover_rate - (2.0 / 8.0)).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_two_windows_yields_no_steps() {
        assert!(temporal_beta_diversity(&[]).is_empty());
        assert!(temporal_beta_diversity(&[set(&["a"])]).is_empty());
    }
}
