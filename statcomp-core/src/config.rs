//! Analysis configuration: defaults, client overrides and the frozen merge
//!
//! The effective configuration is computed once at job creation and never
//! mutated afterwards, so a job's results stay reproducible regardless of
//! later changes to the broker defaults.

use serde::{Deserialize, Serialize};

/// Client-supplied overrides; every field optional, unknown fields rejected
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverrides {
    pub alpha: Option<f64>,
    pub threshold: Option<f64>,
    pub bootstrap_iterations: Option<u32>,
    pub permutation_count: Option<u32>,
    pub sample_size: Option<u32>,
    pub outlier_lower_bound: Option<f64>,
    pub outlier_upper_bound: Option<f64>,
    pub descriptive_enabled: Option<bool>,
    pub clean_all: Option<bool>,
    pub seed: Option<u64>,
    pub plots: Option<PlotToggles>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlotToggles {
    pub histogram: Option<bool>,
    pub boxplot: Option<bool>,
    pub kde: Option<bool>,
}

/// Merged configuration, frozen at job creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    pub alpha: f64,
    pub threshold: Option<f64>,
    pub bootstrap_iterations: u32,
    pub permutation_count: u32,
    /// Effective sample size; None means "smallest cleaned input".
    pub sample_size: Option<u32>,
    pub outlier_lower_bound: f64,
    pub outlier_upper_bound: Option<f64>,
    pub descriptive_enabled: bool,
    /// Remove intermediate artifacts after a successful run.
    pub clean_all: bool,
    pub seed: u64,
    pub plots: PlotFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotFlags {
    pub histogram: bool,
    pub boxplot: bool,
    pub kde: bool,
}

impl PlotFlags {
    pub fn any(&self) -> bool {
        self.histogram || self.boxplot || self.kde
    }
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            threshold: None,
            bootstrap_iterations: 1000,
            permutation_count: 1000,
            sample_size: None,
            outlier_lower_bound: 0.0,
            outlier_upper_bound: None,
            descriptive_enabled: true,
            clean_all: false,
            seed: 42,
            plots: PlotFlags::default(),
        }
    }
}

impl EffectiveConfig {
    /// Defaults overlaid with client overrides.
    pub fn merged(overrides: &ConfigOverrides) -> Self {
        let defaults = Self::default();
        let plots = overrides.plots.clone().unwrap_or_default();
        Self {
            alpha: overrides.alpha.unwrap_or(defaults.alpha),
            threshold: overrides.threshold.or(defaults.threshold),
            bootstrap_iterations: overrides
                .bootstrap_iterations
                .unwrap_or(defaults.bootstrap_iterations),
            permutation_count: overrides
                .permutation_count
                .unwrap_or(defaults.permutation_count),
            sample_size: overrides.sample_size.or(defaults.sample_size),
            outlier_lower_bound: overrides
                .outlier_lower_bound
                .unwrap_or(defaults.outlier_lower_bound),
            outlier_upper_bound: overrides.outlier_upper_bound.or(defaults.outlier_upper_bound),
            descriptive_enabled: overrides
                .descriptive_enabled
                .unwrap_or(defaults.descriptive_enabled),
            clean_all: overrides.clean_all.unwrap_or(defaults.clean_all),
            seed: overrides.seed.unwrap_or(defaults.seed),
            plots: PlotFlags {
                histogram: plots.histogram.unwrap_or(defaults.plots.histogram),
                boxplot: plots.boxplot.unwrap_or(defaults.plots.boxplot),
                kde: plots.kde.unwrap_or(defaults.plots.kde),
            },
        }
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(format!("alpha must be in (0, 1), got {}", self.alpha));
        }
        if self.bootstrap_iterations == 0 {
            return Err("bootstrapIterations must be at least 1".to_string());
        }
        if self.permutation_count == 0 {
            return Err("permutationCount must be at least 1".to_string());
        }
        if self.sample_size == Some(0) {
            return Err("sampleSize must be at least 1".to_string());
        }
        if let Some(upper) = self.outlier_upper_bound {
            if upper < self.outlier_lower_bound {
                return Err(format!(
                    "outlierUpperBound {} is below outlierLowerBound {}",
                    upper, self.outlier_lower_bound
                ));
            }
        }
        Ok(())
    }
}
