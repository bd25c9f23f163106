//! CLI command definitions and dispatch

pub mod job;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;

/// Top-level commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a new analysis job
    Submit {
        /// Job type: BootstrapSingle, BootstrapDual, KwPermutation or DescriptiveOnly
        #[arg(long)]
        job_type: String,

        /// Primary CSV input
        #[arg(long)]
        file1: Option<PathBuf>,

        /// Secondary CSV input
        #[arg(long)]
        file2: Option<PathBuf>,

        /// ZIP bundle for KwPermutation jobs
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Configuration overrides: inline JSON, or @path to a JSON file
        #[arg(long)]
        config: Option<String>,

        /// Poll the job until it reaches a terminal state
        #[arg(long)]
        watch: bool,
    },
    /// Show a job snapshot
    Status {
        /// Job ID
        id: Uuid,
    },
    /// Poll a job until it reaches a terminal state
    Watch {
        /// Job ID
        id: Uuid,
    },
    /// Fetch the result document of a completed job
    Results {
        /// Job ID
        id: Uuid,
    },
    /// List the artifacts written for a job
    Artifacts {
        /// Job ID
        id: Uuid,
    },
    /// Download one artifact
    Fetch {
        /// Job ID
        id: Uuid,

        /// Artifact name, e.g. results.json or plots/file1_histogram.csv
        name: String,

        /// Output path (defaults to the artifact's file name)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Cancel a job
    Cancel {
        /// Job ID
        id: Uuid,
    },
    /// Show the broker's analysis defaults
    Defaults,
}

/// Route commands to their handlers
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    job::handle_job_command(command, config).await
}
