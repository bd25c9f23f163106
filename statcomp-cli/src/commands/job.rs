//! Job command handlers
//!
//! Handles all job-related CLI commands: submission, status/watch polling,
//! results, artifact access and cancellation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use colored::*;
use uuid::Uuid;

use statcomp_client::{BrokerClient, SubmitFiles};
use statcomp_core::config::ConfigOverrides;
use statcomp_core::domain::job::{Job, JobStatus, JobType};

use crate::commands::Commands;
use crate::config::Config;

/// Handle job commands
pub async fn handle_job_command(command: Commands, config: &Config) -> Result<()> {
    let client = BrokerClient::new(&config.broker_url);

    match command {
        Commands::Submit {
            job_type,
            file1,
            file2,
            bundle,
            config: overrides,
            watch,
        } => submit(&client, &job_type, file1, file2, bundle, overrides, watch).await,
        Commands::Status { id } => status(&client, id).await,
        Commands::Watch { id } => watch_job(&client, id).await,
        Commands::Results { id } => results(&client, id).await,
        Commands::Artifacts { id } => artifacts(&client, id).await,
        Commands::Fetch { id, name, out } => fetch(&client, id, &name, out).await,
        Commands::Cancel { id } => cancel(&client, id).await,
        Commands::Defaults => defaults(&client).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn submit(
    client: &BrokerClient,
    job_type: &str,
    file1: Option<PathBuf>,
    file2: Option<PathBuf>,
    bundle: Option<PathBuf>,
    overrides: Option<String>,
    watch: bool,
) -> Result<()> {
    let job_type: JobType = job_type
        .parse()
        .map_err(|message: String| anyhow::anyhow!(message))?;
    let overrides = parse_overrides(overrides.as_deref())?;

    let files = SubmitFiles {
        file1: read_upload(file1.as_deref())?,
        file2: read_upload(file2.as_deref())?,
        kw_bundle: read_upload(bundle.as_deref())?,
    };

    let created = client.submit_job(job_type, &overrides, files).await?;
    println!("{} {}", "Submitted job".bold(), created.job_id);

    if watch {
        watch_job(client, created.job_id).await?;
    }
    Ok(())
}

async fn status(client: &BrokerClient, id: Uuid) -> Result<()> {
    let job = client.get_job(id).await?;
    print_job(&job);
    Ok(())
}

async fn watch_job(client: &BrokerClient, id: Uuid) -> Result<()> {
    loop {
        let job = client.get_job(id).await?;
        println!(
            "{} {:>5.1}%  {}{}",
            colored_status(job.status),
            job.progress.percent,
            job.progress.step,
            job.progress
                .message
                .as_deref()
                .map(|message| format!(" ({})", message))
                .unwrap_or_default()
        );
        if job.is_terminal() {
            print_job(&job);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn results(client: &BrokerClient, id: Uuid) -> Result<()> {
    let document = client.get_results(id).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn artifacts(client: &BrokerClient, id: Uuid) -> Result<()> {
    let listing = client.list_artifacts(id).await?;
    if listing.artifacts.is_empty() {
        println!("{}", "No artifacts yet.".yellow());
        return Ok(());
    }
    println!(
        "{}",
        format!("Found {} artifact(s):", listing.artifacts.len()).bold()
    );
    for artifact in listing.artifacts {
        println!(
            "  {}  {:>10} bytes  {}",
            artifact.name,
            artifact.size_bytes,
            artifact.content_type.as_str().dimmed()
        );
    }
    Ok(())
}

async fn fetch(client: &BrokerClient, id: Uuid, name: &str, out: Option<PathBuf>) -> Result<()> {
    let bytes = client.download_artifact(id, name).await?;
    let target = out.unwrap_or_else(|| {
        PathBuf::from(name.rsplit('/').next().unwrap_or(name))
    });
    std::fs::write(&target, &bytes)
        .with_context(|| format!("could not write {}", target.display()))?;
    println!(
        "{} {} ({} bytes)",
        "Saved".green().bold(),
        target.display(),
        bytes.len()
    );
    Ok(())
}

async fn cancel(client: &BrokerClient, id: Uuid) -> Result<()> {
    let job = client.cancel_job(id).await?;
    println!("{} {}", "Cancellation accepted for job".bold(), job.id);
    print_job(&job);
    Ok(())
}

async fn defaults(client: &BrokerClient) -> Result<()> {
    let defaults = client.config_defaults().await?;
    println!("{}", serde_json::to_string_pretty(&defaults)?);
    Ok(())
}

fn parse_overrides(raw: Option<&str>) -> Result<ConfigOverrides> {
    let Some(raw) = raw else {
        return Ok(ConfigOverrides::default());
    };
    let json = if let Some(path) = raw.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("could not read {}", path))?
    } else {
        raw.to_string()
    };
    serde_json::from_str(&json).context("config overrides are not valid JSON")
}

fn read_upload(path: Option<&Path>) -> Result<Option<(String, Vec<u8>)>> {
    let Some(path) = path else { return Ok(None) };
    let bytes =
        std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
        bail!("{} has no file name", path.display());
    };
    Ok(Some((file_name, bytes)))
}

fn print_job(job: &Job) {
    println!();
    println!("{}", format!("Job {}", job.id).bold());
    println!("  Type:      {}", job.job_type.as_str());
    println!("  Status:    {}", colored_status(job.status));
    println!(
        "  Progress:  {:.1}% ({})",
        job.progress.percent, job.progress.step
    );
    println!("  Created:   {}", job.created_at);
    if let Some(started_at) = job.started_at {
        println!("  Started:   {}", started_at);
    }
    if let Some(finished_at) = job.finished_at {
        println!("  Finished:  {}", finished_at);
    }
    if let Some(error) = &job.error {
        println!(
            "  Error:     {} {}",
            error.code.as_str().red().bold(),
            error.message
        );
    }
    if let Some(groups) = &job.kw_groups {
        println!("  Groups:    {}", groups.join(", "));
    }
}

fn colored_status(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Queued => "Queued".yellow(),
        JobStatus::Running => "Running".blue(),
        JobStatus::Completed => "Completed".green(),
        JobStatus::Failed => "Failed".red(),
        JobStatus::Cancelled => "Cancelled".magenta(),
    }
}
