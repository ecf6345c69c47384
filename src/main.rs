//! Binary entry point for botstore.
//!
//! Operational commands for the storage layer: schema bootstrap, health
//! probing and configuration inspection.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use botstore::observability;
use botstore::services::seed_defaults;
use botstore::{BackendSelector, StoreConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Botstore - document persistence for conversational applications.
#[derive(Parser)]
#[command(name = "botstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "BOTSTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Create tables or indexes, then insert the default data.
    Migrate {
        /// Skip inserting the default bot, intents and integrations.
        #[arg(long)]
        no_seed: bool,
    },

    /// Probe the active backend and print a JSON report.
    Health,

    /// Print the effective configuration with secrets redacted.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StoreConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(
    command: Commands,
    config: StoreConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Migrate { no_seed } => cmd_migrate(&config, no_seed).await,
        Commands::Health => cmd_health(&config).await,
        Commands::Config => cmd_config(&config),
    }
}

async fn cmd_migrate(
    config: &StoreConfig,
    no_seed: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let selector = BackendSelector::connect(config).await?;
    let status = selector.health_status();
    if status.degraded {
        eprintln!(
            "Backend unavailable ({}); nothing to migrate",
            status.reason.unwrap_or_default()
        );
        return Ok(ExitCode::FAILURE);
    }

    let result = async {
        selector.ensure_schema().await?;
        println!("Schema ready on {}", status.backend);

        if !no_seed {
            let report = seed_defaults(&selector).await?;
            println!(
                "Default data: {} inserted, {} already present",
                report.inserted, report.skipped
            );
        }
        Ok::<_, botstore::Error>(())
    }
    .await;

    selector.shutdown().await;
    result?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_health(config: &StoreConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let selector = BackendSelector::connect(config).await?;
    let report = selector.check_health().await;
    selector.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.reachable && !report.degraded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_config(config: &StoreConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(ExitCode::SUCCESS)
}
