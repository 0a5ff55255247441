mod checkpoint;
mod config;
mod launcher;
mod orchestrator;
mod outcome;
mod scheduler;

#[cfg(test)]
mod outcome_test;
#[cfg(test)]
mod scheduler_test;
#[cfg(test)]
mod test_util;

use clap::{ArgAction, Parser, Subcommand};
use config::CampaignConfig;
use orchestrator::Orchestrator;
use outcome::RunOutcome;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "shepherd",
    version,
    about = "Checkpoint-aware job shepherd for batch-scheduled simulations"
)]
struct Cli {
    /// Raise log verbosity, may be given twice
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one orchestration cycle, this is what the batch script invokes
    Run { config: PathBuf },
    /// Render the batch script and submit it to the scheduler
    Submit { config: PathBuf },
    /// Report checkpoint, run state and log status without launching anything
    Status { config: PathBuf },
    /// Validate the campaign configuration and exit
    Check { config: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Check { config } => {
            load_checked(config);
            info!("Configuration is valid");
        }
        Commands::Run { config } => {
            let orchestrator = Orchestrator::new(load_checked(config), config.clone());

            match orchestrator.cycle() {
                Ok(report) => match report.outcome {
                    RunOutcome::Completed => {
                        info!(attempts = report.attempts, "Campaign finished")
                    }
                    RunOutcome::Incomplete => info!(
                        attempts = report.attempts,
                        resubmitted = ?report.resubmitted,
                        "Run did not finish"
                    ),
                },
                Err(e) => {
                    error!("Orchestration cycle failed: {e}");
                    exit(1);
                }
            }
        }
        Commands::Submit { config } => {
            let orchestrator = Orchestrator::new(load_checked(config), config.clone());

            match orchestrator.submit_campaign() {
                Ok(job_id) => info!(job_id = job_id, "Campaign submitted"),
                Err(e) => {
                    error!("Failed to submit campaign: {e}");
                    exit(1);
                }
            }
        }
        Commands::Status { config } => {
            // status must work even when preflight would complain, load raw
            let loaded = match CampaignConfig::load(config) {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!("Failed to load config {}: {e}", config.to_string_lossy());
                    exit(1);
                }
            };
            let orchestrator = Orchestrator::new(loaded, config.clone());

            match orchestrator.status() {
                Ok(status) => info!(
                    checkpoint_files = status.checkpoint_files,
                    state = ?status.state,
                    outcome = ?status.log.outcome,
                    fatal_lines = status.log.fatal_lines.len(),
                    "Campaign status"
                ),
                Err(e) => {
                    error!("Failed to determine status: {e}");
                    exit(1);
                }
            }
        }
    }
}

fn load_checked(path: &PathBuf) -> CampaignConfig {
    let mut config = match CampaignConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config {}: {e}", path.to_string_lossy());
            exit(1);
        }
    };

    if config.preflight_checks() {
        error!("Preflight checks failed, please fix the configuration");
        exit(1);
    }

    config
}
