use crate::config::SchedulerConfig;
use itertools::Itertools;
use std::{
    env,
    fs,
    io::Read,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

const SUBMITTED_PREFIX: &str = "Submitted batch job";

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to write batch script")]
    WriteScript(#[source] std::io::Error),
    #[error("Failed to spawn sbatch")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to wait on sbatch")]
    Wait(#[source] std::io::Error),
    #[error("sbatch did not answer within the submission timeout")]
    SubmitTimeout,
    #[error("sbatch rejected the submission: {0}")]
    Rejected(String),
    #[error("Failed to parse a job id from sbatch output: {0}")]
    UnparsableJobId(String),
}

/// Render the batch script the scheduler re-invokes for every attempt.
/// All directives are declarative resource requests, they are forwarded
/// verbatim and never validated here.
pub fn render_script(
    config: &SchedulerConfig,
    orchestrator: &Path,
    campaign_config: &Path,
) -> String {
    let mut directives = vec![
        format!("--job-name={}", config.job_name),
        format!("--partition={}", config.partition),
        format!("--nodes={}", config.nodes),
        format!("--ntasks={}", config.ntasks),
        format!("--time={}", config.walltime),
        format!("--mem={}", config.memory),
        format!("--output={}", config.log.to_string_lossy()),
    ];
    directives.extend(config.extra_directives.iter().cloned());

    let header = directives
        .iter()
        .map(|directive| format!("#SBATCH {directive}"))
        .join("\n");

    format!(
        "#!/bin/bash\n{header}\n\n\
         cd \"${{SLURM_SUBMIT_DIR:-.}}\"\n\
         {} run {}\n",
        orchestrator.to_string_lossy(),
        campaign_config.to_string_lossy()
    )
}

/// write the rendered script and mark it executable
pub fn write_script(config: &SchedulerConfig, contents: &str) -> Result<(), SchedulerError> {
    fs::write(&config.script, contents).map_err(SchedulerError::WriteScript)?;

    let mut permissions = fs::metadata(&config.script)
        .map_err(SchedulerError::WriteScript)?
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&config.script, permissions).map_err(SchedulerError::WriteScript)?;

    Ok(())
}

/// Submit the batch script and return the scheduler's job id.
/// Unlike the simulation itself, sbatch is expected to answer promptly,
/// so a hanging scheduler frontend is cut off after the configured timeout.
pub fn submit(config: &SchedulerConfig) -> Result<u64, SchedulerError> {
    debug!(script = ?config.script, sbatch = ?config.sbatch, "Submitting batch script");

    let mut child = Command::new(&config.sbatch)
        .arg(&config.script)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(SchedulerError::Spawn)?;

    let timeout = Duration::from_millis(config.submit_timeout);
    let status = match child.wait_timeout(timeout).map_err(SchedulerError::Wait)? {
        Some(status) => status,
        None => {
            if let Err(e) = child.kill() {
                warn!("Failed to kill timed out sbatch: {e}");
            }

            return Err(SchedulerError::SubmitTimeout);
        }
    };

    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());

    if !status.success() {
        return Err(SchedulerError::Rejected(if stderr.is_empty() {
            stdout
        } else {
            stderr
        }));
    }

    let job_id = parse_job_id(&stdout)?;

    info!(job_id = job_id, "Scheduler accepted the submission");

    Ok(job_id)
}

/// extract the job id from the `Submitted batch job <id>` line
pub fn parse_job_id(stdout: &str) -> Result<u64, SchedulerError> {
    stdout
        .lines()
        .find(|line| line.starts_with(SUBMITTED_PREFIX))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| SchedulerError::UnparsableJobId(stdout.trim().to_owned()))
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
    let mut buffer = String::new();

    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_string(&mut buffer) {
            warn!("Failed to read sbatch output: {e}");
        }
    }

    buffer
}

/// task count the scheduler granted this invocation, if running under it
pub fn slurm_ntasks() -> Option<u32> {
    env::var("SLURM_NTASKS")
        .ok()
        .and_then(|value| value.parse().ok())
}

/// directory the job was submitted from, if running under the scheduler
pub fn submit_dir() -> Option<PathBuf> {
    env::var("SLURM_SUBMIT_DIR").ok().map(PathBuf::from)
}
