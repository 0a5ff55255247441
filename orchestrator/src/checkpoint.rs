use crate::config::CheckpointConfig;
use globset::GlobMatcher;
use ignore::WalkBuilder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::{fs, path::PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file")]
    ReadFailed(#[from] std::io::Error),
    #[error("Failed to parse state file")]
    ParseFailed(#[from] serde_yaml::Error),
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Debug, Clone, Copy)]
#[repr(i8)]
pub enum RunPhase {
    Fresh = 0,
    Resumed = 1,
    Completed = 2,
}

/// Orchestrator-side bookkeeping carried across job submissions.
/// The simulation never reads this, it only matters for retry accounting
/// and for spotting a task-count change between launches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunState {
    pub attempts: u32,
    pub ntasks: u32,
    pub phase: RunPhase,
}

impl RunState {
    pub fn fresh(ntasks: u32) -> Self {
        Self {
            attempts: 0,
            ntasks,
            phase: RunPhase::Fresh,
        }
    }

    /// load the persisted state, a missing file means a fresh campaign
    pub fn load(config: &CheckpointConfig) -> Result<Option<Self>, StateError> {
        if !config.state.is_file() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&config.state)?;

        Ok(Some(serde_yaml::from_str(&raw)?))
    }

    pub fn store(&self, config: &CheckpointConfig) -> Result<(), StateError> {
        let raw = serde_yaml::to_string(self)?;

        fs::write(&config.state, raw)?;

        debug!(path = ?config.state, "Persisted run state");

        Ok(())
    }
}

/// Find all restart files below the checkpoint directory.
/// Only their presence matters, the orchestrator never looks inside them.
pub fn find_markers(config: &CheckpointConfig, glob: &GlobMatcher) -> Vec<PathBuf> {
    if !config.dir.is_dir() {
        debug!(dir = ?config.dir, "Checkpoint directory does not exist, treating as fresh start");

        return Vec::new();
    }

    WalkBuilder::new(&config.dir)
        // restart directories are not source trees, keep hidden entries
        .standard_filters(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to walk checkpoint directory: {e}");
                None
            }
        })
        .filter(|entry| {
            entry
                .file_type()
                .map(|file_type| file_type.is_file())
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .filter(|path| match path.file_name() {
            Some(name) => glob.is_match(name),
            None => false,
        })
        .collect_vec()
}

pub fn marker_present(config: &CheckpointConfig, glob: &GlobMatcher) -> bool {
    !find_markers(config, glob).is_empty()
}
