//! Job-scoped storage
//!
//! Every job owns a directory under the storage root with `input/` and
//! `output/` subareas, created at submission and deleted as a unit on
//! cancellation, failure or retention expiry. Artifact names coming from
//! clients pass through [`safe_join`] so they can never escape the job's
//! output area.

use std::fs;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

/// Locations of one job's working data
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub plots_dir: PathBuf,
}

/// Derive the paths for a job without touching the filesystem.
pub fn job_paths(storage_root: &Path, job_id: Uuid) -> JobPaths {
    let root = storage_root.join(job_id.to_string());
    let input_dir = root.join("input");
    let output_dir = root.join("output");
    let plots_dir = output_dir.join("plots");
    JobPaths {
        root,
        input_dir,
        output_dir,
        plots_dir,
    }
}

/// Create the directory layout for a new job.
pub fn prepare_job_paths(storage_root: &Path, job_id: Uuid) -> std::io::Result<JobPaths> {
    let paths = job_paths(storage_root, job_id);
    fs::create_dir_all(&paths.input_dir)?;
    fs::create_dir_all(&paths.plots_dir)?;
    tracing::debug!("prepared job directories at {}", paths.root.display());
    Ok(paths)
}

/// Join a client-supplied relative name onto a base directory, rejecting
/// anything that could traverse outside it (absolute paths, `..`, prefixes).
pub fn safe_join(base: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }
    if relative.components().next().is_none() {
        return None;
    }
    Some(base.join(relative))
}

/// Remove a job's working storage as a unit.
pub fn cleanup_job(paths: &JobPaths) {
    if paths.root.exists() {
        if let Err(error) = fs::remove_dir_all(&paths.root) {
            tracing::warn!(
                "could not remove job directory {}: {}",
                paths.root.display(),
                error
            );
        } else {
            tracing::info!("removed job directory {}", paths.root.display());
        }
    }
}

/// Remove intermediate outputs after a successful run when `clean_all` is
/// set, keeping the result document and summaries.
pub fn cleanup_intermediate(paths: &JobPaths) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let Ok(entries) = fs::read_dir(&paths.output_dir) else {
        return removed;
    };
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_file() && name.ends_with("_cleaned.csv") {
            if fs::remove_file(&path).is_ok() {
                removed.push(path);
            }
        }
    }
    tracing::info!(
        "removed {} intermediate artifacts under {}",
        removed.len(),
        paths.output_dir.display()
    );
    removed
}
