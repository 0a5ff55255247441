use crate::config::{
    CampaignConfig, CheckpointConfig, CompletionConfig, LauncherConfig, RetryPolicy,
    SchedulerConfig, SimulationConfig,
};
use std::{
    collections::BTreeMap,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// write an executable shell script and return its path
pub fn write_fake_exec(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);

    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();

    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();

    path
}

/// a minimal valid campaign rooted in the given directory,
/// with a stand-in simulation and a stand-in sbatch
pub fn campaign(dir: &Path) -> CampaignConfig {
    let exec = write_fake_exec(dir, "sim.sh", "echo \"step 1\"");
    let param_file = dir.join("merger.param");
    fs::write(&param_file, "TimeMax 3.0\n").unwrap();

    CampaignConfig {
        simulation: SimulationConfig {
            exec,
            param_file,
            resume_flag: "1".to_owned(),
            params: Vec::new(),
        },
        launcher: LauncherConfig {
            name: "direct".to_owned(),
            parameter: None,
        },
        scheduler: SchedulerConfig {
            job_name: "galaxy-merger".to_owned(),
            partition: "compute".to_owned(),
            nodes: 1,
            ntasks: 4,
            walltime: "24:00:00".to_owned(),
            memory: "16G".to_owned(),
            log: dir.join("sim.log"),
            sbatch: write_fake_exec(dir, "sbatch.sh", "echo \"Submitted batch job 4242\""),
            script: dir.join("job.sh"),
            extra_directives: Vec::new(),
            submit_timeout: 5_000,
        },
        checkpoint: CheckpointConfig {
            dir: dir.join("restart-files"),
            glob: "restart.*".to_owned(),
            state: dir.join("state.yaml"),
        },
        completion: CompletionConfig {
            marker: "endrun(0)".to_owned(),
            fatal_patterns: Vec::new(),
        },
        environment: BTreeMap::new(),
        policy: RetryPolicy::default(),
    }
}
