use crate::launcher::LauncherError;
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        let metadata = File::open(path).and_then(|file| file.metadata())?;

        Ok((metadata.mode() & 0o111) != 0)
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Checkpoint glob was invalid")]
    InvalidGlob(#[from] globset::Error),
    #[error("Launcher not supported")]
    UnsupportedLauncher(String),
    #[error("Launcher failed to load")]
    FailedLoadLauncher(#[from] LauncherError),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Failed to read file")]
    ReadFailed(#[from] std::io::Error),
    #[error("Failed to parse config file")]
    ParseFailed(#[from] serde_yaml::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    // the external simulation binary and its fixed invocation
    pub simulation: SimulationConfig,
    // launcher config, selects how the simulation processes are spawned
    pub launcher: LauncherConfig,
    // declarative resource requests forwarded to the batch scheduler
    pub scheduler: SchedulerConfig,
    // where restart files and the orchestrator run state live
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    // how a finished run is recognized in the captured log
    pub completion: CompletionConfig,
    // environment injected into the simulation process, e.g. LD_LIBRARY_PATH
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub policy: RetryPolicy,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub exec: PathBuf,
    pub param_file: PathBuf,
    // token appended to the argv to request a resume from restart files
    #[serde(default = "default_resume_flag")]
    pub resume_flag: String,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    // Name of the selected launcher, see Launchers::load for the selection proccess
    pub name: String,
    // parameters for the launcher that apply over all runs
    // TODO: Make this fully typed with an enum
    pub parameter: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    pub job_name: String,
    pub partition: String,
    pub nodes: u32,
    pub ntasks: u32,
    // wall-clock limit in the scheduler's own format, forwarded verbatim
    pub walltime: String,
    pub memory: String,
    // log file the simulation output is appended to, also named in --output
    pub log: PathBuf,
    #[serde(default = "default_sbatch")]
    pub sbatch: PathBuf,
    #[serde(default = "default_script_path")]
    pub script: PathBuf,
    #[serde(default)]
    pub extra_directives: Vec<String>,
    // milliseconds to wait for sbatch itself, not for the simulation
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_checkpoint_glob")]
    pub glob: String,
    #[serde(default = "default_state_path")]
    pub state: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: default_checkpoint_dir(),
            glob: default_checkpoint_glob(),
            state: default_state_path(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfig {
    // exact substring expected in the log once the simulation finished
    pub marker: String,
    // additional abort lines reported loudly when spotted in the log
    #[serde(default)]
    pub fatal_patterns: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    // None keeps the historic behavior: resubmit until the marker shows up
    #[serde(default)]
    pub max_resubmissions: Option<u32>,
}

impl CampaignConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)
            .map_err(|_| ConfigErrors::FileNotFound(path.to_path_buf()))?;

        Ok(serde_yaml::from_reader(file)?)
    }

    /// Compile the restart file glob for checkpoint detection
    pub fn compile_checkpoint_glob(&self) -> Result<GlobMatcher, globset::Error> {
        GlobBuilder::new(&self.checkpoint.glob)
            .build()
            .map(|glob| glob.compile_matcher())
    }

    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        match check_executable(&self.simulation.exec) {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    "simulation.exec {} is not executable",
                    self.simulation.exec.to_string_lossy()
                );
                contains_error = true;
            }
            Err(e) => {
                error!(
                    "Failed to find simulation.exec at {}: {e}",
                    self.simulation.exec.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if !self.simulation.param_file.is_file() {
            error!(
                "simulation.param_file not found at {}",
                self.simulation.param_file.to_string_lossy()
            );
            contains_error = true;
        }

        if self.simulation.resume_flag.is_empty() {
            error!("simulation.resume_flag cannot be empty, a resume would be indistinguishable from a fresh start");
            contains_error = true;
        }

        self.launcher.name = self.launcher.name.to_lowercase();
        match self.launcher.name.as_str() {
            "mpi" | "direct" => {}
            launcher_name => {
                error!("launcher.name ({launcher_name}) is not supported, please use `mpi` or `direct`");
                contains_error = true;
            }
        }

        if let Some(parameter) = &self.launcher.parameter {
            if parameter
                .get("mpirun")
                .filter(|value| !value.is_string())
                .is_some()
            {
                error!("launcher.parameter.mpirun must be a string path to the mpirun executable");
                contains_error = true;
            }
        }

        if self.scheduler.ntasks == 0 {
            error!("scheduler.ntasks cannot be 0, the simulation needs at least one task");
            contains_error = true;
        }

        if self.scheduler.nodes == 0 {
            error!("scheduler.nodes cannot be 0");
            contains_error = true;
        }

        if self.scheduler.walltime.is_empty() {
            warn!("scheduler.walltime is empty, the scheduler's partition default will apply");
        }

        if self.completion.marker.is_empty() {
            error!("completion.marker cannot be empty, every log would count as a finished run");
            contains_error = true;
        }

        if let Err(e) = self.compile_checkpoint_glob() {
            error!("Failed to compile checkpoint.glob: {e}");
            contains_error = true;
        }

        contains_error
    }
}

fn default_resume_flag() -> String {
    // the convention of the simulation binary: a bare `1` after the parameter file
    "1".to_owned()
}

fn default_sbatch() -> PathBuf {
    PathBuf::from_str("sbatch").unwrap()
}

fn default_script_path() -> PathBuf {
    PathBuf::from_str("shepherd-job.sh").unwrap()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from_str("restart-files").unwrap()
}

fn default_checkpoint_glob() -> String {
    "restart.*".to_owned()
}

fn default_state_path() -> PathBuf {
    PathBuf::from_str("shepherd-state.yaml").unwrap()
}

fn default_submit_timeout() -> u64 {
    10_000
}
