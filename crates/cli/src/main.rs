//! CLI entry point for vidarchive
//!
//! Loads configuration, runs one pass over the staging area, and prints the
//! run summary. Exit status: 0 when every file was backed up, 2 when any file
//! was quarantined, 1 when the run could not start.

mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use vidarchive::{BackupService, Config, FfmpegTools, RunSummary, ServiceOptions};

const DEFAULT_CONFIG: &str = "vidarchive.toml";

/// vidarchive - verified preservation of archival video
#[derive(Parser, Debug)]
#[command(name = "vidarchive")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Staging directory (overrides paths.staging)
    #[arg(long)]
    staging: Option<PathBuf>,

    /// Backup store (overrides paths.backup)
    #[arg(long)]
    backup: Option<PathBuf>,

    /// Quarantine directory (overrides paths.quarantine)
    #[arg(long)]
    quarantine: Option<PathBuf>,

    /// Directory for the run log (overrides paths.logs)
    #[arg(long)]
    logs: Option<PathBuf>,

    /// Skip startup checks (tool availability, directory layout). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

/// File, then environment, then command line.
///
/// A missing file is only tolerated at the default path, for deployments
/// configured entirely through the environment.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config == Path::new(DEFAULT_CONFIG) && !args.config.exists() {
        Config::from_env()
    } else {
        Config::load(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    };

    if let Some(dir) = &args.staging {
        config.paths.staging = Some(dir.clone());
    }
    if let Some(dir) = &args.backup {
        config.paths.backup = Some(dir.clone());
    }
    if let Some(dir) = &args.quarantine {
        config.paths.quarantine = Some(dir.clone());
    }
    if let Some(dir) = &args.logs {
        config.paths.logs = Some(dir.clone());
    }

    Ok(config)
}

async fn run(args: &Args, config: &Config) -> Result<RunSummary> {
    let service = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        BackupService::new_without_checks(
            config.directory_layout()?,
            ServiceOptions::from_config(config),
            FfmpegTools::from_config(config),
        )
    } else {
        BackupService::new(config)?
    };

    let layout = service.layout();
    info!(
        staging = %layout.staging.display(),
        backup = %layout.backup.display(),
        quarantine = %layout.quarantine.display(),
        "Starting run"
    );

    Ok(service.run().await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    let _guard = match logging::init_logging(config.paths.logs.as_deref()) {
        Ok((guard, log_path)) => {
            if let Some(path) = log_path {
                info!(log = %path.display(), "Writing run log");
            }
            guard
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    match run(&args, &config).await {
        Ok(summary) => {
            println!("{}", summary);
            if summary.all_backed_up() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Run aborted");
            ExitCode::from(1)
        }
    }
}
