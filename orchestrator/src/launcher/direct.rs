use super::{run_to_exit, LauncherError};
use crate::config::CampaignConfig;
use std::{ffi::OsString, process::ExitStatus};
use tracing::instrument;

/// Launcher that runs the simulation binary as a single local process,
/// meant for smoke tests of a parameter file without going through mpirun
#[derive(Clone, Debug)]
pub struct DirectLauncher {
    config: CampaignConfig,
}

impl DirectLauncher {
    pub fn load(config: &CampaignConfig) -> Result<Self, LauncherError> {
        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn command_line(&self, resume: bool) -> Vec<OsString> {
        let mut argv = vec![
            self.config.simulation.exec.clone().into_os_string(),
            self.config.simulation.param_file.clone().into_os_string(),
        ];

        argv.extend(self.config.simulation.params.iter().map(OsString::from));

        if resume {
            argv.push(OsString::from(&self.config.simulation.resume_flag));
        }

        argv
    }

    #[instrument(skip(self), level = "info")]
    pub fn launch(&self, resume: bool) -> Result<ExitStatus, LauncherError> {
        run_to_exit(
            &self.command_line(resume),
            &self.config.environment,
            &self.config.scheduler.log,
        )
    }
}
