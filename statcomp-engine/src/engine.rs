//! Analysis engine dispatch
//!
//! [`StatEngine`] is the built-in implementation of the [`AnalysisEngine`]
//! seam the worker runtime drives. One entry point per job type family:
//! bootstrap flows (single, dual, descriptive-only) and the Kruskal-Wallis
//! permutation flow, both following the same phase/percent layout the
//! progress API exposes to polling clients.

use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use uuid::Uuid;

use statcomp_core::config::EffectiveConfig;
use statcomp_core::domain::job::JobType;

use crate::bootstrap::{bootstrap_p95, compare_p95s, compare_to_threshold};
use crate::context::ExecutionContext;
use crate::descriptive::{Descriptive, percentile, summarize};
use crate::error::EngineError;
use crate::ingest::{CleanedSeries, CleaningRules, load_series};
use crate::kruskal::permutation_test;
use crate::report::{
    Decision, FileReport, GroupReport, Omnibus, PlotRef, ResultDocument, write_boxplot_data,
    write_cleaned_series, write_histogram_data, write_kde_data, write_kw_summary, write_results,
};

/// Locations of a job's working data
#[derive(Debug, Clone)]
pub struct Workspace {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    pub fn plots_dir(&self) -> PathBuf {
        self.output_dir.join("plots")
    }
}

/// Inputs to a single analysis run
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub config: EffectiveConfig,
    pub workspace: Workspace,
    /// Classified group names; populated for Kruskal-Wallis jobs only.
    pub kw_groups: Vec<String>,
}

/// Seam between the worker runtime and the statistical engine.
///
/// Implementations are synchronous and CPU-bound; the worker runs them on a
/// blocking thread and injects progress/cancellation through the context.
pub trait AnalysisEngine: Send + Sync {
    fn run(
        &self,
        request: &AnalysisRequest,
        ctx: &ExecutionContext,
    ) -> Result<ResultDocument, EngineError>;
}

/// Built-in engine implementing the full analysis suite
#[derive(Debug, Default)]
pub struct StatEngine;

impl StatEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisEngine for StatEngine {
    fn run(
        &self,
        request: &AnalysisRequest,
        ctx: &ExecutionContext,
    ) -> Result<ResultDocument, EngineError> {
        fs::create_dir_all(&request.workspace.output_dir)?;
        fs::create_dir_all(request.workspace.plots_dir())?;

        let mut rng = StdRng::seed_from_u64(request.config.seed);
        let document = match request.job_type {
            JobType::KwPermutation => run_kw_permutation(request, ctx, &mut rng)?,
            _ => run_bootstrap_flows(request, ctx, &mut rng)?,
        };
        write_results(&request.workspace.output_dir, &document)?;
        Ok(document)
    }
}

struct LoadedInput {
    label: String,
    series: CleanedSeries,
}

fn run_bootstrap_flows(
    request: &AnalysisRequest,
    ctx: &ExecutionContext,
    rng: &mut StdRng,
) -> Result<ResultDocument, EngineError> {
    let config = &request.config;
    ctx.report(5.0, "prepare", Some("Preparing inputs"));
    ctx.guard()?;

    let mut warnings = Vec::new();
    let inputs = load_inputs(request, ctx, &mut warnings)?;
    ctx.report(25.0, "clean", Some("Inputs cleaned"));
    ctx.guard()?;

    let mut descriptive: Option<Descriptive> = None;
    let mut descriptive_2: Option<Descriptive> = None;
    if config.descriptive_enabled || request.job_type == JobType::DescriptiveOnly {
        descriptive = summarize(&inputs[0].series.values);
        descriptive_2 = inputs.get(1).and_then(|input| summarize(&input.series.values));
        ctx.report(40.0, "descriptive", Some("Descriptive analysis complete"));
        ctx.guard()?;
    }

    let plots = write_plot_artifacts(request, &inputs)?;

    if request.job_type == JobType::DescriptiveOnly {
        ctx.report(90.0, "finalize", Some("Finalizing outputs"));
        ctx.guard()?;
        return Ok(ResultDocument {
            job_id: request.job_id,
            job_type: request.job_type,
            decision: None,
            metrics: None,
            descriptive,
            descriptive_2,
            omnibus: None,
            groups: None,
            plots,
            warnings,
        });
    }

    let samples = draw_samples(&inputs, config, rng);
    ctx.report(50.0, "sampling", Some("Sampling ready"));
    ctx.guard()?;

    let iterations = config.bootstrap_iterations;
    let comparison = if request.job_type == JobType::BootstrapDual {
        if samples.len() < 2 {
            return Err(EngineError::InvalidInput(
                "dual bootstrap requires two inputs".to_string(),
            ));
        }
        let stats_1 = bootstrap_p95(&samples[0], iterations, rng, ctx, "bootstrap", 55.0, 12.5)?;
        let stats_2 = bootstrap_p95(&samples[1], iterations, rng, ctx, "bootstrap", 67.5, 12.5)?;
        let sample_size = samples[0].len().min(samples[1].len());
        compare_p95s(&stats_1, &stats_2, sample_size, config.alpha)
    } else {
        let stats = bootstrap_p95(&samples[0], iterations, rng, ctx, "bootstrap", 55.0, 25.0)?;
        let threshold = config.threshold.unwrap_or(0.0);
        compare_to_threshold(&stats, threshold, samples[0].len(), config.alpha)
    };
    ctx.report(85.0, "bootstrap", Some("Bootstrap complete"));

    let decision = Decision {
        alpha: comparison.alpha,
        p_value: comparison.p_value,
        significant: Some(comparison.significant),
    };
    ctx.report(90.0, "finalize", Some("Finalizing outputs"));
    ctx.guard()?;

    Ok(ResultDocument {
        job_id: request.job_id,
        job_type: request.job_type,
        decision: Some(decision),
        metrics: Some(comparison),
        descriptive,
        descriptive_2,
        omnibus: None,
        groups: None,
        plots,
        warnings,
    })
}

fn run_kw_permutation(
    request: &AnalysisRequest,
    ctx: &ExecutionContext,
    rng: &mut StdRng,
) -> Result<ResultDocument, EngineError> {
    let config = &request.config;
    ctx.report(10.0, "prepare", Some("Preparing KW groups"));
    ctx.guard()?;

    if request.kw_groups.is_empty() {
        return Err(EngineError::InvalidInput(
            "Kruskal-Wallis job carries no classified groups".to_string(),
        ));
    }

    let rules = CleaningRules::from_config(config);
    let mut warnings = Vec::new();
    let mut group_values: Vec<Vec<f64>> = Vec::with_capacity(request.kw_groups.len());
    let mut group_reports: Vec<GroupReport> = Vec::with_capacity(request.kw_groups.len());

    for group_name in &request.kw_groups {
        let group_dir = request.workspace.input_dir.join(group_name);
        let files = list_group_files(&group_dir, group_name)?;

        let mut combined = Vec::new();
        let mut file_reports = Vec::with_capacity(files.len());
        for file_path in files {
            let series = load_series(&file_path, &rules)?;
            let file_name = file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            note_drops(&mut warnings, &format!("{}/{}", group_name, file_name), &series);

            let stem = file_name.trim_end_matches(".csv");
            let mut sorted = series.values.clone();
            sorted.sort_by(f64::total_cmp);
            write_cleaned_series(
                &request.workspace.output_dir,
                &format!("{}_{}_cleaned.csv", group_name, stem),
                &series.values,
            )?;
            file_reports.push(FileReport {
                file_name,
                n: sorted.len(),
                median: percentile(&sorted, 50.0),
                p95: percentile(&sorted, 95.0),
            });
            combined.extend_from_slice(&series.values);
            ctx.guard()?;
        }
        group_values.push(combined);
        group_reports.push(GroupReport {
            group_name: group_name.clone(),
            files: file_reports,
        });
    }

    let result = permutation_test(
        &group_values,
        config.permutation_count,
        rng,
        ctx,
        30.0,
        50.0,
    )?;
    let omnibus = Omnibus::from_result(&result);
    write_kw_summary(&request.workspace.output_dir, &group_reports, &omnibus)?;

    ctx.report(90.0, "finalize", Some("KW artifacts ready"));
    ctx.guard()?;

    Ok(ResultDocument {
        job_id: request.job_id,
        job_type: request.job_type,
        decision: Some(Decision {
            alpha: config.alpha,
            p_value: result.p_value,
            significant: Some(result.p_value < config.alpha),
        }),
        metrics: None,
        descriptive: None,
        descriptive_2: None,
        omnibus: Some(omnibus),
        groups: Some(group_reports),
        plots: Vec::new(),
        warnings,
    })
}

/// Load file1.csv (required) and file2.csv (when present), writing cleaned
/// copies next to the results.
fn load_inputs(
    request: &AnalysisRequest,
    ctx: &ExecutionContext,
    warnings: &mut Vec<String>,
) -> Result<Vec<LoadedInput>, EngineError> {
    let rules = CleaningRules::from_config(&request.config);
    let mut inputs = Vec::new();
    for label in ["file1", "file2"] {
        let path = request.workspace.input_dir.join(format!("{}.csv", label));
        if !path.exists() {
            continue;
        }
        let series = load_series(&path, &rules)?;
        note_drops(warnings, &format!("{}.csv", label), &series);
        write_cleaned_series(
            &request.workspace.output_dir,
            &format!("{}_cleaned.csv", label),
            &series.values,
        )?;
        inputs.push(LoadedInput {
            label: label.to_string(),
            series,
        });
        ctx.guard()?;
    }
    if inputs.is_empty() {
        return Err(EngineError::InvalidInput(
            "no input CSVs found for job".to_string(),
        ));
    }
    Ok(inputs)
}

fn note_drops(warnings: &mut Vec<String>, source: &str, series: &CleanedSeries) {
    if series.dropped_non_numeric > 0 || series.dropped_out_of_range > 0 {
        warnings.push(format!(
            "{}: dropped {} non-numeric and {} out-of-range rows",
            source, series.dropped_non_numeric, series.dropped_out_of_range
        ));
    }
}

/// Effective sample per input: the configured size, defaulting to the
/// smallest cleaned input; subsampled without replacement when smaller than
/// the cleaned series.
fn draw_samples(inputs: &[LoadedInput], config: &EffectiveConfig, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let smallest = inputs
        .iter()
        .map(|input| input.series.values.len())
        .min()
        .unwrap_or(0);
    let target = config
        .sample_size
        .map(|size| size as usize)
        .unwrap_or(smallest)
        .max(1);

    inputs
        .iter()
        .map(|input| {
            let values = &input.series.values;
            if target >= values.len() {
                values.clone()
            } else {
                values.choose_multiple(rng, target).copied().collect()
            }
        })
        .collect()
}

fn write_plot_artifacts(
    request: &AnalysisRequest,
    inputs: &[LoadedInput],
) -> Result<Vec<PlotRef>, EngineError> {
    let flags = request.config.plots;
    if !flags.any() {
        return Ok(Vec::new());
    }
    let plots_dir = request.workspace.plots_dir();
    let mut refs = Vec::new();
    for input in inputs {
        let mut sorted = input.series.values.clone();
        sorted.sort_by(f64::total_cmp);
        if flags.histogram {
            refs.push(write_histogram_data(&plots_dir, &input.label, &sorted)?);
        }
        if flags.boxplot {
            refs.push(write_boxplot_data(&plots_dir, &input.label, &sorted)?);
        }
        if flags.kde {
            refs.push(write_kde_data(&plots_dir, &input.label, &sorted)?);
        }
    }
    refs.sort_by(|a, b| a.artifact_name.cmp(&b.artifact_name));
    Ok(refs)
}

/// Sorted CSV files directly under a classified group directory.
fn list_group_files(group_dir: &Path, group_name: &str) -> Result<Vec<PathBuf>, EngineError> {
    if !group_dir.is_dir() {
        return Err(EngineError::InvalidInput(format!(
            "group directory missing for {}",
            group_name
        )));
    }
    let mut files: Vec<PathBuf> = fs::read_dir(group_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "no CSV files found for group {}",
            group_name
        )));
    }
    Ok(files)
}
