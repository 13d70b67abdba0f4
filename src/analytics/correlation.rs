//! Pearson correlation between weather variables and detection counts
//! (`spec.md` §4.5).

/// Standard Pearson product-moment correlation over aligned `(x, y)` pairs
/// where either side may be absent (`None` entries are filtered out
/// before computing, per the spec's "any aligned-None entries filtered").
/// Fewer than 2 usable points is defined to correlate as 0, not NaN or an
/// error.
pub fn pearson_correlation(pairs: &[(Option<f64>, Option<f64>)]) -> f64 {
    let aligned: Vec<(f64, f64)> = pairs.iter().filter_map(|&(x, y)| Some((x?, y?))).collect();

    if aligned.len() < 2 {
        return 0.0;
    }

    let n = aligned.len() as f64;
    let mean_x = aligned.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = aligned.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for &(x, y) in &aligned {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }

    cov / (var_x.sqrt() * var_y.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_correlated_series_yields_one() {
        let pairs: Vec<(Option<f64>, Option<f64>)> = (1..=5).map(|i| (Some(f64::from(i)), Some(f64::from(i) * 2.0))).collect();
        assert!((pearson_correlation(&pairs) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn perfectly_inverse_series_yields_negative_one() {
        let pairs: Vec<(Option<f64>, Option<f64>)> = (1..=5).map(|i| (Some(f64::from(i)), Some(-f64::from(i)))).collect();
        assert!((pearson_correlation(&pairs) - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn none_entries_are_filtered_before_computing() {
        let pairs = vec![
            (Some(1.0), Some(2.0)),
            (None, Some(5.0)),
            (Some(2.0), None),
            (Some(3.0), Some(6.0)),
        ];
        // only (1,2) and (3,6) survive alignment: still perfectly correlated.
        assert!((pearson_correlation(&pairs) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_two_points_correlates_as_zero() {
        assert_eq!(pearson_correlation(&[]), 0.0);
        assert_eq!(pearson_correlation(&[(Some(1.0), Some(1.0))]), 0.0);
    }

    #[test]
    fn zero_variance_correlates_as_zero() {
        let pairs = vec![(Some(1.0), Some(1.0)), (Some(1.0), Some(2.0)), (Some(1.0), Some(3.0))];
        assert_eq!(pearson_correlation(&pairs), 0.0);
    }
}
