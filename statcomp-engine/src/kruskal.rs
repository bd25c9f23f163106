//! Kruskal-Wallis H statistic and label-permutation testing
//!
//! The H statistic is computed from average ranks with tie correction. The
//! permutation test shuffles the pooled sample, reassigns group labels by
//! position and counts how often the permuted H reaches the observed one.
//! Tie correction depends only on the pooled multiset, so it is computed once
//! and reused across permutations.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::EngineError;

/// Observed omnibus statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KwObserved {
    pub h_statistic: f64,
    pub tie_correction: f64,
    pub n_total: usize,
    pub group_sizes: Vec<usize>,
}

/// Result of a permutation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KwPermutationResult {
    pub observed: KwObserved,
    /// Fraction of permutations with H at least the observed value.
    pub p_value: f64,
    pub iterations: u32,
}

/// Permutation test over ≥2 groups of cleaned values.
pub fn permutation_test(
    groups: &[Vec<f64>],
    iterations: u32,
    rng: &mut StdRng,
    ctx: &ExecutionContext,
    start: f64,
    span: f64,
) -> Result<KwPermutationResult, EngineError> {
    if groups.len() < 2 {
        return Err(EngineError::InvalidInput(
            "permutation test requires at least two groups".to_string(),
        ));
    }
    if let Some(position) = groups.iter().position(|group| group.is_empty()) {
        return Err(EngineError::InvalidInput(format!(
            "group at position {} has no values after cleaning",
            position
        )));
    }

    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let mut pooled: Vec<f64> = groups.iter().flatten().copied().collect();
    let n_total = pooled.len();

    let correction = tie_correction(&pooled);
    let observed_h = h_statistic(&average_ranks(&pooled), &sizes, correction);

    let mut at_least_observed = 0u32;
    for index in 0..iterations {
        pooled.shuffle(rng);
        let h = h_statistic(&average_ranks(&pooled), &sizes, correction);
        if h >= observed_h {
            at_least_observed += 1;
        }
        ctx.loop_checkpoint("permutation", index, iterations, start, span)?;
    }

    Ok(KwPermutationResult {
        observed: KwObserved {
            h_statistic: observed_h,
            tie_correction: correction,
            n_total,
            group_sizes: sizes,
        },
        p_value: f64::from(at_least_observed) / f64::from(iterations.max(1)),
        iterations,
    })
}

/// Average (midrank) 1-based ranks for a sample in its given order.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Ranks i+1 ..= j+1 share the average.
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &original in &order[i..=j] {
            ranks[original] = average;
        }
        i = j + 1;
    }
    ranks
}

/// Tie correction factor `1 - Σ(t³ - t) / (n³ - n)`; 0 when every value ties.
fn tie_correction(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 1.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut tie_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        tie_sum += t.powi(3) - t;
        i = j + 1;
    }
    let n_f = n as f64;
    1.0 - tie_sum / (n_f.powi(3) - n_f)
}

/// H from positional ranks: the first `sizes[0]` ranks belong to group 0, and
/// so on. Returns 0 when the tie correction degenerates (all values equal).
fn h_statistic(ranks: &[f64], sizes: &[usize], tie_correction: f64) -> f64 {
    if tie_correction == 0.0 {
        return 0.0;
    }
    let n = ranks.len() as f64;
    let mut offset = 0;
    let mut rank_term = 0.0;
    for &size in sizes {
        let sum: f64 = ranks[offset..offset + size].iter().sum();
        rank_term += sum * sum / size as f64;
        offset += size;
    }
    let h = 12.0 / (n * (n + 1.0)) * rank_term - 3.0 * (n + 1.0);
    h / tie_correction
}
