use super::{run_to_exit, LauncherError};
use crate::config::CampaignConfig;
use std::{ffi::OsString, path::PathBuf, process::ExitStatus, str::FromStr};
use tracing::instrument;

/// Launcher that starts the simulation under mpirun with a fixed task count
#[derive(Clone, Debug)]
pub struct MpiLauncher {
    config: CampaignConfig,
    mpirun: PathBuf,
    mpirun_params: Vec<String>,
    ntasks: u32,
}

impl MpiLauncher {
    pub fn load(config: &CampaignConfig, ntasks: u32) -> Result<Self, LauncherError> {
        let mut mpirun = default_mpirun();
        let mut mpirun_params = Vec::new();

        if let Some(parameter) = &config.launcher.parameter {
            if let Some(value) = parameter.get("mpirun") {
                match value.as_str() {
                    Some(path) => mpirun = PathBuf::from(path),
                    None => return Err(LauncherError::InvalidParameter("mpirun")),
                }
            }

            if let Some(value) = parameter.get("params") {
                match value.as_str() {
                    Some(params) => {
                        mpirun_params = params.split_whitespace().map(str::to_owned).collect()
                    }
                    None => return Err(LauncherError::InvalidParameter("params")),
                }
            }
        }

        Ok(Self {
            config: config.clone(),
            mpirun,
            mpirun_params,
            ntasks,
        })
    }

    pub fn command_line(&self, resume: bool) -> Vec<OsString> {
        let mut argv = vec![
            self.mpirun.clone().into_os_string(),
            OsString::from("-np"),
            OsString::from(self.ntasks.to_string()),
        ];

        argv.extend(self.mpirun_params.iter().map(OsString::from));
        argv.push(self.config.simulation.exec.clone().into_os_string());
        argv.push(self.config.simulation.param_file.clone().into_os_string());
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

fn default_mpirun() -> PathBuf {
    PathBuf::from_str("mpirun").unwrap()
}
