//! Stem-and-leaf detection frequency distribution (`spec.md` §4.5).

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StemLeaf {
    pub stem: String,
    pub leaves: String,
}

/// Builds a stem-and-leaf plot of `per_hour_counts` (one entry per hour
/// across the period): stem is the tens digit, leaf is the ones digit,
/// leaves within a stem are listed in the order their hours occurred. An
/// empty period yields a single `{stem: "0", leaves: "No data"}` row
/// rather than an empty list, matching the spec's explicit edge case.
pub fn stem_and_leaf(per_hour_counts: &[u32]) -> Vec<StemLeaf> {
    if per_hour_counts.is_empty() {
        return vec![StemLeaf {
            stem: "0".to_string(),
            leaves: "No data".to_string(),
        }];
    }

    let mut by_stem: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for &count in per_hour_counts {
        by_stem.entry(count / 10).or_default().push(count % 10);
    }

    by_stem
        .into_iter()
        .map(|(stem, leaves)| StemLeaf {
            stem: stem.to_string(),
            leaves: leaves.iter().map(u32::to_string).collect::<Vec<_>>().join(" "),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_period_yields_the_no_data_sentinel() {
        let result = stem_and_leaf(&[]);
        assert_eq!(result, vec![StemLeaf { stem: "0".to_string(), leaves: "No data".to_string() }]);
    }

    #[test]
    fn groups_by_tens_digit() {
        let result = stem_and_leaf(&[3, 12, 15, 27, 29]);
        assert_eq!(
            result,
            vec![
                StemLeaf { stem: "0".to_string(), leaves: "3".to_string() },
                StemLeaf { stem: "1".to_string(), leaves: "2 5".to_string() },
                StemLeaf { stem: "2".to_string(), leaves: "7 9".to_string() },
            ]
        );
    }
}
