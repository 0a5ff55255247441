use crate::{
    checkpoint::{self, RunPhase, RunState},
    config::{CampaignConfig, ConfigErrors},
    launcher::{LauncherError, Launchers},
    outcome::{scan_log, LogReport, RunOutcome},
    scheduler::{self, SchedulerError},
};
use std::{env, path::PathBuf, str::FromStr};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration failed to load")]
    Config(#[from] ConfigErrors),
    #[error("Simulation launch failed")]
    Launcher(#[from] LauncherError),
    #[error("Scheduler interaction failed")]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: RunOutcome,
    /// job id of the follow-up submission, if one was made
    pub resubmitted: Option<u64>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub checkpoint_files: usize,
    pub state: Option<RunState>,
    pub log: LogReport,
}

pub struct Orchestrator {
    config: CampaignConfig,
    config_path: PathBuf,
}

impl Orchestrator {
    pub fn new(config: CampaignConfig, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// One orchestration cycle: decide fresh vs. resume, run the simulation
    /// to exit, read the log, and resubmit when the marker is missing.
    /// The retry loop lives across job submissions, not inside this process.
    #[instrument(skip(self), level = "info")]
    pub fn cycle(&self) -> Result<CycleReport, OrchestratorError> {
        // relative paths in the config are anchored at the submission directory
        if let Some(dir) = scheduler::submit_dir() {
            if let Err(e) = env::set_current_dir(&dir) {
                warn!(dir = ?dir, "Failed to change into the submission directory: {e}");
            }
        }

        let glob = self
            .config
            .compile_checkpoint_glob()
            .map_err(ConfigErrors::InvalidGlob)?;

        let ntasks = scheduler::slurm_ntasks().unwrap_or(self.config.scheduler.ntasks);

        let mut state = match RunState::load(&self.config.checkpoint) {
            Ok(Some(state)) => state,
            Ok(None) => RunState::fresh(ntasks),
            Err(e) => {
                warn!("Run state was unreadable, treating this as a fresh campaign: {e}");

                RunState::fresh(ntasks)
            }
        };

        match nix::unistd::gethostname() {
            Ok(host) => info!(host = ?host, attempt = state.attempts + 1, "Starting cycle"),
            Err(e) => warn!("Failed to retrieve hostname: {e}"),
        }

        let resume = checkpoint::marker_present(&self.config.checkpoint, &glob);

        if resume {
            if state.ntasks != ntasks {
                // the external simulation aborts on its own when resumed with a
                // different task count, nothing here prevents the attempt
                warn!(
                    recorded = state.ntasks,
                    requested = ntasks,
                    "Task count differs from the original run, the simulation will likely abort"
                );
            }

            info!("Restart files found, resuming from the last checkpoint");
        } else {
            info!("No restart files found, starting fresh");
            state.ntasks = ntasks;
        }

        let launcher = Launchers::load(&self.config, ntasks)?;

        debug!(argv = ?launcher.command_line(resume), "Prepared simulation command");

        let status = launcher.launch(resume)?;

        // the exit status is reported but never decides the outcome,
        // a wall-clock kill and a clean finish both end up here
        info!(success = status.success(), code = ?status.code(), "Simulation exited");

        let report = scan_log(&self.config.scheduler.log, &self.config.completion);

        for line in &report.fatal_lines {
            error!(line = line.as_str(), "Known abort line in the simulation log");
        }

        state.attempts += 1;
        state.phase = match (report.outcome, resume) {
            (RunOutcome::Completed, _) => RunPhase::Completed,
            (RunOutcome::Incomplete, true) => RunPhase::Resumed,
            (RunOutcome::Incomplete, false) => RunPhase::Fresh,
        };

        let resubmitted = match report.outcome {
            RunOutcome::Completed => {
                info!("Completion marker found, the campaign is finished");

                None
            }
            RunOutcome::Incomplete if self.allow_resubmit(&state) => Some(self.resubmit()?),
            RunOutcome::Incomplete => None,
        };

        if let Err(e) = state.store(&self.config.checkpoint) {
            warn!("Failed to persist run state: {e}");
        }

        Ok(CycleReport {
            outcome: report.outcome,
            resubmitted,
            attempts: state.attempts,
        })
    }

    /// Kick off a campaign: render the batch script and hand it to the scheduler.
    pub fn submit_campaign(&self) -> Result<u64, OrchestratorError> {
        let script = scheduler::render_script(
            &self.config.scheduler,
            &orchestrator_exec(),
            &self.config_path,
        );

        scheduler::write_script(&self.config.scheduler, &script)?;

        Ok(scheduler::submit(&self.config.scheduler)?)
    }

    /// Report checkpoint, state and log status without launching anything.
    pub fn status(&self) -> Result<StatusReport, OrchestratorError> {
        let glob = self
            .config
            .compile_checkpoint_glob()
            .map_err(ConfigErrors::InvalidGlob)?;

        let state = match RunState::load(&self.config.checkpoint) {
            Ok(state) => state,
            Err(e) => {
                warn!("Run state was unreadable: {e}");

                None
            }
        };

        Ok(StatusReport {
            checkpoint_files: checkpoint::find_markers(&self.config.checkpoint, &glob).len(),
            state,
            log: scan_log(&self.config.scheduler.log, &self.config.completion),
        })
    }

    fn allow_resubmit(&self, state: &RunState) -> bool {
        match self.config.policy.max_resubmissions {
            // historic behavior: resubmit unconditionally until the marker appears
            None => true,
            Some(max) => {
                // the first submission is the kick-off, so attempt n implies
                // n - 1 resubmissions happened before it
                let done = state.attempts.saturating_sub(1);

                if done < max {
                    true
                } else {
                    error!(
                        max_resubmissions = max,
                        "Resubmission ceiling reached, giving up on the campaign"
                    );

                    false
                }
            }
        }
    }

    fn resubmit(&self) -> Result<u64, SchedulerError> {
        // when the cycle runs outside a submitted job the script may not exist yet
        if !self.config.scheduler.script.is_file() {
            let script = scheduler::render_script(
                &self.config.scheduler,
                &orchestrator_exec(),
                &self.config_path,
            );

            scheduler::write_script(&self.config.scheduler, &script)?;
        }

        scheduler::submit(&self.config.scheduler)
    }
}

fn orchestrator_exec() -> PathBuf {
    env::current_exe().unwrap_or_else(|_| PathBuf::from_str("shepherd").unwrap())
}
