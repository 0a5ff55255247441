pub mod direct;
pub mod mpi;


use crate::config::{CampaignConfig, ConfigErrors};
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::OpenOptions,
    path::Path,
    process::{Command, ExitStatus, Stdio},
};
use thiserror::Error;
use tracing::info;
use tracing_unwrap::OptionExt;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Failed to open log file for appending")]
    OpenLog(#[source] std::io::Error),
    #[error("Failed to spawn the simulation process")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to wait on the simulation process")]
    Wait(#[source] std::io::Error),
    #[error("launcher.parameter.{0} has the wrong type")]
    InvalidParameter(&'static str),
}

#[derive(Clone, Debug)]
/// All launcher variants, initialized from `Launchers::load`
/// (this is deliberately not made with dynamic dispatch to avoid the headache)
pub enum Launchers {
    Mpi(mpi::MpiLauncher),
    Direct(direct::DirectLauncher),
}

impl Launchers {
    pub fn load(config: &CampaignConfig, ntasks: u32) -> Result<Self, ConfigErrors> {
        match config.launcher.name.as_str() {
            "mpi" => Ok(Self::Mpi(mpi::MpiLauncher::load(config, ntasks)?)),
            "direct" => Ok(Self::Direct(direct::DirectLauncher::load(config)?)),
            _ => Err(ConfigErrors::UnsupportedLauncher(
                config.launcher.name.clone(),
            )),
        }
    }

    /// The full argv the simulation is started with, resume flag included when requested
    pub fn command_line(&self, resume: bool) -> Vec<OsString> {
        match self {
            Self::Mpi(launcher) => launcher.command_line(resume),
            Self::Direct(launcher) => launcher.command_line(resume),
        }
    }

    /// Start the simulation and block until it exits.
    /// The wall-clock limit is the scheduler's business, there is no timeout here.
    pub fn launch(&self, resume: bool) -> Result<ExitStatus, LauncherError> {
        match self {
            Self::Mpi(launcher) => launcher.launch(resume),
            Self::Direct(launcher) => launcher.launch(resume),
        }
    }
}

/// spawn the given argv with its output appended to the run log and wait for it
pub(crate) fn run_to_exit(
    argv: &[OsString],
    environment: &BTreeMap<String, String>,
    log_path: &Path,
) -> Result<ExitStatus, LauncherError> {
    let log = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_path)
        .map_err(LauncherError::OpenLog)?;
    let log_stderr = log.try_clone().map_err(LauncherError::OpenLog)?;

    // argv is built by the launchers and always starts with the executable
    let (exec, args) = argv.split_first().unwrap_or_log();

    let mut child = Command::new(exec)
        .args(args)
        .envs(environment)
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_stderr))
        .spawn()
        .map_err(LauncherError::Spawn)?;

    info!(pid = child.id(), "Simulation started, blocking until it exits");

    child.wait().map_err(LauncherError::Wait)
}
