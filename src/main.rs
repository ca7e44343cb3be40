//! issuehub command-line entry point
//!
//! Aggregates diagnostic dumps from the command line and prints the result.

use std::path::PathBuf;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use issuehub::commands::{ConfigCommand, OutputFormat, ReportCommand};
use issuehub::core::IssuesConfig;

/// Application name
pub const APP_NAME: &str = "issuehub";

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Aggregate IDE diagnostics into one issue list")]
struct Cli {
    /// Use this configuration file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge JSON diagnostic dumps and print the issue list
    Report {
        /// Dumps to load, in priority order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Maximum issues to list before collapsing the rest
        #[arg(long)]
        cap: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the effective configuration
    Config,
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    info!("{} v{} starting...", APP_NAME, issuehub::core::VERSION);

    let config = match &cli.config {
        Some(path) => IssuesConfig::load_from(path).await?,
        None => IssuesConfig::load().await?,
    };

    match cli.command {
        Command::Report { files, cap, format } => {
            let report = ReportCommand { files, cap }.execute(&config).await?;
            println!("{}", report.render(format)?);
        }
        Command::Config => {
            print!("{}", ConfigCommand.execute(&config)?);
        }
    }

    Ok(())
}
