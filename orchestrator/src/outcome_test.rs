use crate::{
    outcome::{scan_log, RunOutcome},
    test_util,
};
use std::fs;
use tempfile::tempdir;

#[test]
pub fn marker_in_log_means_completed() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    fs::write(
        &config.scheduler.log,
        "Begin Step 831, Time: 2.99\nendrun(0) called, simulation finished\n",
    )
    .unwrap();

    let report = scan_log(&config.scheduler.log, &config.completion);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.fatal_lines.is_empty());
}

#[test]
pub fn missing_marker_means_incomplete() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    fs::write(
        &config.scheduler.log,
        "Begin Step 831, Time: 2.99\nslurmstepd: *** JOB CANCELLED DUE TO TIME LIMIT ***\n",
    )
    .unwrap();

    let report = scan_log(&config.scheduler.log, &config.completion);

    assert_eq!(report.outcome, RunOutcome::Incomplete);
}

#[test]
pub fn missing_log_counts_as_incomplete() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    let report = scan_log(&config.scheduler.log, &config.completion);

    assert_eq!(report.outcome, RunOutcome::Incomplete);
}

#[test]
pub fn configured_fatal_patterns_are_collected() {
    let dir = tempdir().unwrap();
    let mut config = test_util::campaign(dir.path());
    config.completion.fatal_patterns = vec!["endrun called with code 7".to_owned()];

    fs::write(
        &config.scheduler.log,
        "Begin Step 4, Time: 0.02\nendrun called with code 7\n",
    )
    .unwrap();

    let report = scan_log(&config.scheduler.log, &config.completion);

    // fatal lines are observability only, the outcome stays marker-driven
    assert_eq!(report.outcome, RunOutcome::Incomplete);
    assert_eq!(report.fatal_lines.len(), 1);
}

#[test]
pub fn known_abort_lines_are_collected_without_config() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    fs::write(
        &config.scheduler.log,
        "restarting with a different number of processors is not allowed\n",
    )
    .unwrap();

    let report = scan_log(&config.scheduler.log, &config.completion);

    assert_eq!(report.outcome, RunOutcome::Incomplete);
    assert_eq!(report.fatal_lines.len(), 1);
}

#[test]
pub fn non_utf8_log_is_tolerated() {
    let dir = tempdir().unwrap();
    let config = test_util::campaign(dir.path());

    let mut raw = b"garbage \xff\xfe bytes\nendrun(0) called\n".to_vec();
    raw.extend_from_slice(&[0xf0, 0x28]);
    fs::write(&config.scheduler.log, raw).unwrap();

    let report = scan_log(&config.scheduler.log, &config.completion);

    assert_eq!(report.outcome, RunOutcome::Completed);
}
