//! Normalized result documents and artifact writers
//!
//! Every completed job persists a `results.json` with a stable camelCase
//! shape: a decision/summary block plus plot references, with job-type
//! specific sections (metrics/descriptive for bootstrap flows, omnibus/groups
//! for Kruskal-Wallis). Plot artifacts are written as data summaries
//! (histogram bins, five-number box summaries) under `plots/`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use statcomp_core::domain::job::JobType;

use crate::bootstrap::BootstrapComparison;
use crate::descriptive::Descriptive;
use crate::error::EngineError;
use crate::kruskal::KwPermutationResult;

pub const RESULTS_FILE: &str = "results.json";
pub const KW_SUMMARY_FILE: &str = "kw_summary.csv";

/// Normalized result document served by `GET /jobs/{id}/results`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDocument {
    pub job_id: Uuid,
    pub job_type: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BootstrapComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptive: Option<Descriptive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptive_2: Option<Descriptive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omnibus: Option<Omnibus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupReport>>,
    pub plots: Vec<PlotRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Decision block present for every hypothesis-testing job type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub alpha: f64,
    pub p_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significant: Option<bool>,
}

/// Omnibus block for Kruskal-Wallis results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Omnibus {
    pub h_statistic: f64,
    pub permutations: u32,
    pub total_n: usize,
    pub tie_correction: f64,
    pub group_sizes: Vec<usize>,
}

impl Omnibus {
    pub fn from_result(result: &KwPermutationResult) -> Self {
        Self {
            h_statistic: result.observed.h_statistic,
            permutations: result.iterations,
            total_n: result.observed.n_total,
            tie_correction: result.observed.tie_correction,
            group_sizes: result.observed.group_sizes.clone(),
        }
    }
}

/// Per-group breakdown for Kruskal-Wallis results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    pub group_name: String,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub file_name: String,
    pub n: usize,
    pub median: f64,
    pub p95: f64,
}

/// Reference to a plot-data artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotRef {
    pub kind: String,
    /// Output-relative artifact name, e.g. `plots/file1_histogram.csv`.
    pub artifact_name: String,
}

/// Persist the normalized document as `results.json`.
pub fn write_results(output_dir: &Path, document: &ResultDocument) -> Result<PathBuf, EngineError> {
    let path = output_dir.join(RESULTS_FILE);
    fs::write(&path, serde_json::to_vec_pretty(document)?)?;
    Ok(path)
}

/// Persist the per-group KW summary as CSV.
pub fn write_kw_summary(
    output_dir: &Path,
    groups: &[GroupReport],
    omnibus: &Omnibus,
) -> Result<PathBuf, EngineError> {
    let path = output_dir.join(KW_SUMMARY_FILE);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["group", "file", "n", "median", "p95", "h_statistic"])?;
    for group in groups {
        for file in &group.files {
            writer.write_record([
                group.group_name.as_str(),
                file.file_name.as_str(),
                &file.n.to_string(),
                &file.median.to_string(),
                &file.p95.to_string(),
                &omnibus.h_statistic.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(path)
}

/// Write a cleaned series back out as a one-value-per-row CSV artifact.
pub fn write_cleaned_series(
    output_dir: &Path,
    name: &str,
    values: &[f64],
) -> Result<PathBuf, EngineError> {
    let path = output_dir.join(name);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)?;
    for value in values {
        writer.write_record([value.to_string()])?;
    }
    writer.flush()?;
    Ok(path)
}

const HISTOGRAM_BINS: usize = 20;

/// Histogram bin counts for one dataset, written under `plots/`.
pub fn write_histogram_data(
    plots_dir: &Path,
    label: &str,
    values: &[f64],
) -> Result<PlotRef, EngineError> {
    let file_name = format!("{}_histogram.csv", label);
    let path = plots_dir.join(&file_name);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["bin_start", "bin_end", "count"])?;

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = ((max - min) / HISTOGRAM_BINS as f64).max(f64::MIN_POSITIVE);
    let mut counts = [0usize; HISTOGRAM_BINS];
    for &value in values {
        let bin = (((value - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    for (bin, count) in counts.iter().enumerate() {
        let start = min + bin as f64 * width;
        writer.write_record([
            start.to_string(),
            (start + width).to_string(),
            count.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(PlotRef {
        kind: "histogram".to_string(),
        artifact_name: format!("plots/{}", file_name),
    })
}

const KDE_GRID_POINTS: usize = 100;

/// Gaussian kernel density estimate on a fixed grid, Scott bandwidth,
/// written under `plots/`.
pub fn write_kde_data(
    plots_dir: &Path,
    label: &str,
    sorted: &[f64],
) -> Result<PlotRef, EngineError> {
    let file_name = format!("{}_kde.csv", label);
    let path = plots_dir.join(&file_name);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["x", "density"])?;

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let bandwidth = (1.06 * variance.sqrt() * n.powf(-0.2)).max(f64::MIN_POSITIVE);

    let min = sorted[0] - 3.0 * bandwidth;
    let max = sorted[sorted.len() - 1] + 3.0 * bandwidth;
    let step = (max - min) / (KDE_GRID_POINTS - 1) as f64;
    let norm = 1.0 / (n * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    for i in 0..KDE_GRID_POINTS {
        let x = min + i as f64 * step;
        let density: f64 = sorted
            .iter()
            .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
            .sum::<f64>()
            * norm;
        writer.write_record([x.to_string(), density.to_string()])?;
    }
    writer.flush()?;
    Ok(PlotRef {
        kind: "kde".to_string(),
        artifact_name: format!("plots/{}", file_name),
    })
}

/// Five-number summary used to render a box plot, written under `plots/`.
pub fn write_boxplot_data(
    plots_dir: &Path,
    label: &str,
    sorted: &[f64],
) -> Result<PlotRef, EngineError> {
    use crate::descriptive::percentile;

    let file_name = format!("{}_boxplot.csv", label);
    let path = plots_dir.join(&file_name);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["min", "q1", "median", "q3", "max"])?;
    writer.write_record([
        sorted[0].to_string(),
        percentile(sorted, 25.0).to_string(),
        percentile(sorted, 50.0).to_string(),
        percentile(sorted, 75.0).to_string(),
        sorted[sorted.len() - 1].to_string(),
    ])?;
    writer.flush()?;
    Ok(PlotRef {
        kind: "boxplot".to_string(),
        artifact_name: format!("plots/{}", file_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_document_wire_shape() {
        let document = ResultDocument {
            job_id: Uuid::new_v4(),
            job_type: JobType::KwPermutation,
            decision: Some(Decision {
                alpha: 0.05,
                p_value: 0.01,
                significant: Some(true),
            }),
            metrics: None,
            descriptive: None,
            descriptive_2: None,
            omnibus: Some(Omnibus {
                h_statistic: 7.2,
                permutations: 100,
                total_n: 9,
                tie_correction: 1.0,
                group_sizes: vec![3, 3, 3],
            }),
            groups: Some(vec![]),
            plots: vec![],
            warnings: vec![],
        };
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["decision"]["pValue"], 0.01);
        assert_eq!(json["omnibus"]["hStatistic"], 7.2);
        assert!(json.get("metrics").is_none());
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn test_histogram_counts_cover_all_values() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let reference = write_histogram_data(dir.path(), "data", &values).unwrap();
        assert_eq!(reference.artifact_name, "plots/data_histogram.csv");

        let content = std::fs::read_to_string(dir.path().join("data_histogram.csv")).unwrap();
        let total: usize = content
            .lines()
            .skip(1)
            .map(|line| line.rsplit(',').next().unwrap().parse::<usize>().unwrap())
            .sum();
        assert_eq!(total, 100);
    }
}
