//! Statcomp CLI
//!
//! Command-line interface for interacting with the statcomp broker.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "statcomp")]
#[command(about = "Statcomp analysis job CLI", long_about = None)]
struct Cli {
    /// Broker URL
    #[arg(
        long,
        env = "STATCOMP_BROKER_URL",
        default_value = "http://localhost:8080"
    )]
    broker_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        broker_url: cli.broker_url,
    };

    handle_command(cli.command, &config).await
}
