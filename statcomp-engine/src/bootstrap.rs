//! Bootstrap comparison of empirical P95s
//!
//! Percentile bootstrap: the input series is resampled with replacement, the
//! P95 of each resample is recorded, and decisions are read off the resulting
//! bootstrap distribution. Two flavors: P95 against a fixed threshold, and
//! P95 against the P95 of a second series.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::descriptive::percentile;
use crate::error::EngineError;

/// Decision and point estimates from a bootstrap run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapComparison {
    pub alpha: f64,
    /// Two-sided bootstrap p-value, always in [0, 1].
    pub p_value: f64,
    pub significant: bool,
    pub sample_size: usize,
    pub p95: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub margin_of_error_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_lower_2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_upper_2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_of_error_pct_2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// Bootstrap distribution of the P95 statistic.
///
/// Checkpoints the context once per `checkpoint_every` iterations, mapping
/// the loop onto `[start, start + span]` percent.
pub fn bootstrap_p95(
    values: &[f64],
    iterations: u32,
    rng: &mut StdRng,
    ctx: &ExecutionContext,
    step: &str,
    start: f64,
    span: f64,
) -> Result<Vec<f64>, EngineError> {
    let n = values.len();
    let mut stats = Vec::with_capacity(iterations as usize);
    let mut resample = vec![0.0; n];
    for index in 0..iterations {
        for slot in resample.iter_mut() {
            *slot = values[rng.gen_range(0..n)];
        }
        resample.sort_by(f64::total_cmp);
        stats.push(percentile(&resample, 95.0));
        ctx.loop_checkpoint(step, index, iterations, start, span)?;
    }
    Ok(stats)
}

/// Compare a bootstrap P95 distribution against a fixed threshold.
pub fn compare_to_threshold(
    stats: &[f64],
    threshold: f64,
    sample_size: usize,
    alpha: f64,
) -> BootstrapComparison {
    let (point, ci_lower, ci_upper) = estimates(stats, alpha);
    let below = fraction(stats, |s| s <= threshold);
    let p_value = two_sided(below);
    BootstrapComparison {
        alpha,
        p_value,
        significant: p_value < alpha,
        sample_size,
        p95: point,
        ci_lower,
        ci_upper,
        margin_of_error_pct: margin_pct(point, ci_lower, ci_upper),
        p95_2: None,
        ci_lower_2: None,
        ci_upper_2: None,
        margin_of_error_pct_2: None,
        threshold: Some(threshold),
    }
}

/// Compare two bootstrap P95 distributions via their paired differences.
pub fn compare_p95s(
    stats_1: &[f64],
    stats_2: &[f64],
    sample_size: usize,
    alpha: f64,
) -> BootstrapComparison {
    let (point_1, lower_1, upper_1) = estimates(stats_1, alpha);
    let (point_2, lower_2, upper_2) = estimates(stats_2, alpha);

    let pairs = stats_1.len().min(stats_2.len());
    let diffs: Vec<f64> = (0..pairs).map(|i| stats_1[i] - stats_2[i]).collect();
    let below = fraction(&diffs, |d| d <= 0.0);
    let p_value = two_sided(below);

    BootstrapComparison {
        alpha,
        p_value,
        significant: p_value < alpha,
        sample_size,
        p95: point_1,
        ci_lower: lower_1,
        ci_upper: upper_1,
        margin_of_error_pct: margin_pct(point_1, lower_1, upper_1),
        p95_2: Some(point_2),
        ci_lower_2: Some(lower_2),
        ci_upper_2: Some(upper_2),
        margin_of_error_pct_2: Some(margin_pct(point_2, lower_2, upper_2)),
        threshold: None,
    }
}

/// Point estimate (mean of the distribution) and percentile confidence bounds.
fn estimates(stats: &[f64], alpha: f64) -> (f64, f64, f64) {
    let mut sorted = stats.to_vec();
    sorted.sort_by(f64::total_cmp);
    let point = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let lower = percentile(&sorted, alpha / 2.0 * 100.0);
    let upper = percentile(&sorted, (1.0 - alpha / 2.0) * 100.0);
    (point, lower, upper)
}

fn fraction(values: &[f64], predicate: impl Fn(f64) -> bool) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|&&v| predicate(v)).count() as f64 / values.len() as f64
}

fn two_sided(below: f64) -> f64 {
    (2.0 * below.min(1.0 - below)).clamp(0.0, 1.0)
}

fn margin_pct(point: f64, lower: f64, upper: f64) -> f64 {
    if point == 0.0 {
        return 0.0;
    }
    (upper - lower) / (2.0 * point.abs()) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn run_bootstrap(values: &[f64], iterations: u32, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        bootstrap_p95(
            values,
            iterations,
            &mut rng,
            &ExecutionContext::noop(),
            "bootstrap",
            0.0,
            100.0,
        )
        .unwrap()
    }

    #[test]
    fn test_bootstrap_is_deterministic_per_seed() {
        let values: Vec<f64> = (0..200).map(|i| f64::from(i % 37)).collect();
        assert_eq!(run_bootstrap(&values, 100, 7), run_bootstrap(&values, 100, 7));
        assert_ne!(run_bootstrap(&values, 100, 7), run_bootstrap(&values, 100, 8));
    }

    #[test]
    fn test_threshold_far_below_distribution_is_significant() {
        let values: Vec<f64> = (0..200).map(|i| 100.0 + f64::from(i % 10)).collect();
        let stats = run_bootstrap(&values, 200, 42);
        let result = compare_to_threshold(&stats, 1.0, values.len(), 0.05);
        assert_eq!(result.p_value, 0.0);
        assert!(result.significant);
        assert!(result.ci_lower <= result.ci_upper);
        assert!((0.0..=1.0).contains(&result.p_value));
    }

    #[test]
    fn test_identical_distributions_not_significant() {
        let values: Vec<f64> = (0..500).map(|i| f64::from(i % 50)).collect();
        let stats_1 = run_bootstrap(&values, 400, 1);
        let stats_2 = run_bootstrap(&values, 400, 2);
        let result = compare_p95s(&stats_1, &stats_2, values.len(), 0.05);
        assert!(!result.significant, "p-value was {}", result.p_value);
        assert!((0.0..=1.0).contains(&result.p_value));
    }

    #[test]
    fn test_disjoint_distributions_significant() {
        let low: Vec<f64> = (0..300).map(|i| 10.0 + f64::from(i % 5)).collect();
        let high: Vec<f64> = (0..300).map(|i| 500.0 + f64::from(i % 5)).collect();
        let stats_1 = run_bootstrap(&low, 300, 3);
        let stats_2 = run_bootstrap(&high, 300, 4);
        let result = compare_p95s(&stats_1, &stats_2, 300, 0.05);
        assert!(result.significant);
        assert_eq!(result.p_value, 0.0);
    }

    #[test]
    fn test_interrupt_stops_resampling() {
        use crate::context::Interrupt;
        let ctx = ExecutionContext::new(
            Box::new(|_, _, _| {}),
            Box::new(|| Err(Interrupt::TimedOut)),
            1,
        );
        let mut rng = StdRng::seed_from_u64(0);
        let err = bootstrap_p95(&[1.0, 2.0, 3.0], 100, &mut rng, &ctx, "bootstrap", 0.0, 1.0)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Interrupted(Interrupt::TimedOut)
        ));
    }
}
