use crate::{scheduler, test_util};
use std::{fs, os::unix::fs::PermissionsExt, path::Path};
use tempfile::tempdir;

#[test]
pub fn rendered_script_carries_every_directive() {
    let dir = tempdir().unwrap();
    let mut config = test_util::campaign(dir.path());
    config.scheduler.extra_directives = vec!["--exclusive".to_owned()];

    let script = scheduler::render_script(
        &config.scheduler,
        Path::new("/usr/local/bin/shepherd"),
        Path::new("campaign.yaml"),
    );

    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("#SBATCH --job-name=galaxy-merger"));
    assert!(script.contains("#SBATCH --partition=compute"));
    assert!(script.contains("#SBATCH --nodes=1"));
    assert!(script.contains("#SBATCH --ntasks=4"));
    assert!(script.contains("#SBATCH --time=24:00:00"));
    assert!(script.contains("#SBATCH --mem=16G"));
    assert!(script.contains("#SBATCH --output="));
    assert!(script.contains("#SBATCH --exclusive"));
    assert!(script.contains("/usr/local/bin/shepherd run campaign.yaml"));
}

#[test]
pub fn written_script_is_executable() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    scheduler::write_script(&config.scheduler, "#!/bin/bash\n").unwrap();

    let mode = fs::metadata(&config.scheduler.script)
        .unwrap()
        .permissions()
        .mode();
    assert_ne!(mode & 0o111, 0);
}

#[test]
pub fn job_id_parses_from_sbatch_output() {
    assert_eq!(
        scheduler::parse_job_id("Submitted batch job 123456\n").unwrap(),
        123456
    );
}

#[test]
pub fn garbage_sbatch_output_is_an_error() {
    assert!(scheduler::parse_job_id("sbatch: error: invalid partition\n").is_err());
}

#[test]
pub fn submit_returns_the_job_id() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    scheduler::write_script(&config.scheduler, "#!/bin/bash\n").unwrap();

    assert_eq!(scheduler::submit(&config.scheduler).unwrap(), 4242);
}

#[test]
pub fn rejected_submission_is_an_error() {
    let dir = tempdir().unwrap();
    let mut config = test_util::campaign(dir.path());
    config.scheduler.sbatch = test_util::write_fake_exec(
        dir.path(),
        "sbatch-reject.sh",
        "echo \"sbatch: error: Batch job submission failed\" >&2\nexit 1",
    );

    scheduler::write_script(&config.scheduler, "#!/bin/bash\n").unwrap();

    assert!(matches!(
        scheduler::submit(&config.scheduler),
        Err(scheduler::SchedulerError::Rejected(_))
    ));
}

#[test]
pub fn hanging_sbatch_is_cut_off() {
    let dir = tempdir().unwrap();
    let mut config = test_util::campaign(dir.path());
    config.scheduler.sbatch = test_util::write_fake_exec(dir.path(), "sbatch-hang.sh", "sleep 30");
    config.scheduler.submit_timeout = 200;

    scheduler::write_script(&config.scheduler, "#!/bin/bash\n").unwrap();

    assert!(matches!(
        scheduler::submit(&config.scheduler),
        Err(scheduler::SchedulerError::SubmitTimeout)
    ));
}
