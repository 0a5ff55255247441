use crate::config::CompletionConfig;
use once_cell::sync::Lazy;
use std::{fs, path::Path};
use tracing::{debug, warn};

/// Abort lines the external simulation is known to emit. These are always
/// scanned for, on top of the configured patterns, so a human reading the
/// orchestrator log sees the reason without opening the simulation log.
/// They never change the resubmission decision, only the marker does.
pub static KNOWN_FATAL_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "restarting with a different number of processors",
        "Failed to open restart file",
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// the completion marker was found, the campaign is over
    Completed,
    /// no marker, either the wall clock ran out or the simulation died
    Incomplete,
}

#[derive(Debug, Clone)]
pub struct LogReport {
    pub outcome: RunOutcome,
    /// lines matching a fatal pattern, in log order
    pub fatal_lines: Vec<String>,
}

/// Scan the captured simulation log for the completion marker.
/// A missing or unreadable log counts as an incomplete run, the decision is
/// made on log text alone and never on the process exit status.
pub fn scan_log(path: &Path, completion: &CompletionConfig) -> LogReport {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = ?path, "Failed to read simulation log, treating run as incomplete: {e}");

            return LogReport {
                outcome: RunOutcome::Incomplete,
                fatal_lines: Vec::new(),
            };
        }
    };

    // simulation output is not guaranteed to be clean UTF-8
    let text = String::from_utf8_lossy(&raw);

    let mut outcome = RunOutcome::Incomplete;
    let mut fatal_lines = Vec::new();

    for line in text.lines() {
        if line.contains(&completion.marker) {
            outcome = RunOutcome::Completed;
        }

        if KNOWN_FATAL_PATTERNS
            .iter()
            .any(|pattern| line.contains(pattern))
            || completion
                .fatal_patterns
                .iter()
                .any(|pattern| line.contains(pattern))
        {
            fatal_lines.push(line.to_owned());
        }
    }

    debug!(outcome = ?outcome, fatal = fatal_lines.len(), "Scanned simulation log");

    LogReport {
        outcome,
        fatal_lines,
    }
}
