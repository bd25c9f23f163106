//! CSV ingestion and cleaning
//!
//! Inputs are single-column numeric CSVs; a header row is tolerated and
//! dropped with the other non-numeric rows. Cleaning removes values that are
//! not finite numbers, negative durations, and values outside the configured
//! outlier bounds, keeping counts of everything it dropped.

use std::path::Path;

use statcomp_core::config::EffectiveConfig;

use crate::error::EngineError;

/// Bounds applied while cleaning a series
#[derive(Debug, Clone, Copy)]
pub struct CleaningRules {
    pub lower_bound: f64,
    pub upper_bound: Option<f64>,
}

impl CleaningRules {
    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self {
            lower_bound: config.outlier_lower_bound,
            upper_bound: config.outlier_upper_bound,
        }
    }
}

/// A cleaned numeric series plus bookkeeping about what was dropped
#[derive(Debug, Clone)]
pub struct CleanedSeries {
    pub values: Vec<f64>,
    pub total_rows: usize,
    pub dropped_non_numeric: usize,
    pub dropped_out_of_range: usize,
}

/// Load and clean the first column of a CSV file.
///
/// Fails with `InvalidInput` when no numeric value survives; partially dirty
/// files are accepted and the drops are counted.
pub fn load_series(path: &Path, rules: &CleaningRules) -> Result<CleanedSeries, EngineError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<input>".to_string());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let series = clean_records(&mut reader, rules)?;
    if series.values.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "no numeric values found in {}",
            file_name
        )));
    }
    Ok(series)
}

/// Request-time check used by the facade: the payload must contain at least
/// one numeric value in its first column.
pub fn validate_csv(bytes: &[u8]) -> Result<(), EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let series = clean_records(
        &mut reader,
        &CleaningRules {
            lower_bound: f64::NEG_INFINITY,
            upper_bound: None,
        },
    )?;
    if series.values.is_empty() {
        return Err(EngineError::InvalidInput(
            "no numeric values in first column".to_string(),
        ));
    }
    Ok(())
}

fn clean_records<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    rules: &CleaningRules,
) -> Result<CleanedSeries, EngineError> {
    let mut values = Vec::new();
    let mut total_rows = 0;
    let mut dropped_non_numeric = 0;
    let mut dropped_out_of_range = 0;

    for record in reader.records() {
        let record = record?;
        total_rows += 1;
        let field = record.get(0).map(str::trim).unwrap_or("");
        match field.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                if value < 0.0
                    || value < rules.lower_bound
                    || rules.upper_bound.is_some_and(|upper| value > upper)
                {
                    dropped_out_of_range += 1;
                } else {
                    values.push(value);
                }
            }
            _ => dropped_non_numeric += 1,
        }
    }

    Ok(CleanedSeries {
        values,
        total_rows,
        dropped_non_numeric,
        dropped_out_of_range,
    })
}
