//! Species accumulation curves (`spec.md` §4.5).
//!
//! `(sample_count, distinct_species_so_far)` pairs over an ordered
//! detection sequence. Method `random` shuffles the sequence and averages
//! several runs (parallelised with `rayon`, since each run is independent
//! and the method exists specifically to smooth out order effects a
//! single shuffle wouldn't). Method `rarefaction` computes the expected
//! count analytically instead of simulating it.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMethod {
    Random,
    Rarefaction,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccumulationPoint {
    pub sample_count: usize,
    pub distinct_species: f64,
}

const RANDOM_METHOD_RUNS: usize = 100;

pub fn accumulation_curve(species_sequence: &[String], method: AccumulationMethod) -> Vec<AccumulationPoint> {
    match method {
        AccumulationMethod::Random => random_method(species_sequence),
        AccumulationMethod::Rarefaction => rarefaction_method(species_sequence),
    }
}

fn random_method(species_sequence: &[String]) -> Vec<AccumulationPoint> {
    if species_sequence.is_empty() {
        return Vec::new();
    }

    let n = species_sequence.len();
    let sums: Vec<f64> = (0..RANDOM_METHOD_RUNS)
        .into_par_iter()
        .map(|_| {
            let mut shuffled = species_sequence.to_vec();
            shuffled.shuffle(&mut rand::thread_rng());

            let mut seen = HashSet::new();
            let mut per_sample = vec![0.0; n];
            for (i, species) in shuffled.iter().enumerate() {
                seen.insert(species.clone());
                per_sample[i] = seen.len() as f64;
            }
            per_sample
        })
        .reduce(
            || vec![0.0; n],
            |mut acc, run| {
                for (a, r) in acc.iter_mut().zip(run.iter()) {
                    *a += r;
                }
                acc
            },
        );

    sums.into_iter()
        .enumerate()
        .map(|(i, total)| AccumulationPoint {
            sample_count: i + 1,
            distinct_species: total / RANDOM_METHOD_RUNS as f64,
        })
        .collect()
}

/// Analytic rarefaction: the expected number of distinct species observed
/// in a random sample of size `m` drawn without replacement from a
/// population of `n` individuals across `S` species, each species `i`
/// contributing `n_i` individuals, is:
///
/// `S - sum_i C(n - n_i, m) / C(n, m)`
///
/// computed here via log-gamma ratios to stay numerically stable for
/// realistic detection counts.
fn rarefaction_method(species_sequence: &[String]) -> Vec<AccumulationPoint> {
    if species_sequence.is_empty() {
        return Vec::new();
    }

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for species in species_sequence {
        *counts.entry(species.as_str()).or_insert(0) += 1;
    }
    let n = species_sequence.len();
    let species_counts: Vec<usize> = counts.values().copied().collect();
    let total_species = species_counts.len();

    (1..=n)
        .map(|m| {
            let expected = total_species as f64
                - species_counts
                    .iter()
                    .map(|&n_i| log_binomial_ratio(n, n_i, m))
                    .sum::<f64>();
            AccumulationPoint {
                sample_count: m,
                distinct_species: expected.max(0.0),
            }
        })
        .collect()
}

/// `C(n - n_i, m) / C(n, m)`, or 0 if `n - n_i < m` (that species is
/// certain to appear in any sample of size `m`).
fn log_binomial_ratio(n: usize, n_i: usize, m: usize) -> f64 {
    if n.saturating_sub(n_i) < m {
        return 0.0;
    }
    let log_c = |a: usize, b: usize| -> f64 { ln_factorial(a) - ln_factorial(b) - ln_factorial(a - b) };
    (log_c(n - n_i, m) - log_c(n, m)).exp()
}

fn ln_factorial(n: usize) -> f64 {
    statrs::function::gamma::ln_gamma(n as f64 + 1.0)
}
