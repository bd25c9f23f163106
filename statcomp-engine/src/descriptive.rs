//! Descriptive statistics

use serde::{Deserialize, Serialize};

/// Summary block for one cleaned dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptive {
    pub sample_size: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub p95: f64,
}

/// Summarize a cleaned series; `None` when the series is empty.
pub fn summarize(values: &[f64]) -> Option<Descriptive> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std_dev = sample_std_dev(&sorted, mean);

    Some(Descriptive {
        sample_size: n,
        mean,
        median: percentile(&sorted, 50.0),
        min: sorted[0],
        max: sorted[n - 1],
        std_dev,
        skewness: skewness(&sorted, mean, std_dev),
        p95: percentile(&sorted, 95.0),
    })
}

/// Linear-interpolation percentile over an ascending-sorted slice.
///
/// Matches the "linear" definition: rank `q/100 * (n-1)` interpolated between
/// its neighbors. The slice must be non-empty.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

fn skewness(values: &[f64], mean: f64, std_dev: f64) -> f64 {
    let n = values.len();
    if n < 3 || std_dev == 0.0 {
        return 0.0;
    }
    let m3: f64 = values.iter().map(|v| ((v - mean) / std_dev).powi(3)).sum();
    let n_f = n as f64;
    n_f / ((n_f - 1.0) * (n_f - 2.0)) * m3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 100.0), 40.0);
        assert_eq!(percentile(&sorted, 50.0), 25.0);
        // rank 0.95 * 3 = 2.85 -> 30 + 0.85 * 10
        assert!((percentile(&sorted, 95.0) - 38.5).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_known_values() {
        let summary = summarize(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(summary.sample_size, 5);
        assert_eq!(summary.mean, 3.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert!((summary.std_dev - 1.5811388300841898).abs() < 1e-12);
        assert!(summary.skewness.abs() < 1e-12);
    }

    #[test]
    fn test_summarize_empty_is_none() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_skewed_sample_has_positive_skewness() {
        let summary = summarize(&[1.0, 1.0, 1.0, 1.0, 100.0]).unwrap();
        assert!(summary.skewness > 0.0);
    }
}
