//! Configuration for the replicated log.

use crate::error::{RaftLogError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a [`ReplicatedLog`](crate::log::ReplicatedLog).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory holding the durable log store.
    pub data_dir: PathBuf,
    /// Number of live entries that triggers a compaction snapshot.
    pub compaction_threshold: usize,
    /// Worker capacity for background tasks (compaction, joint-consensus
    /// follow-ups). Kept small so commit-path threads are never starved.
    pub compaction_workers: usize,
    /// How many snapshots to retain in the snapshot store; older ones are
    /// pruned when a new snapshot is written.
    pub snapshot_retention: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("raftlog-data"),
            compaction_threshold: 10_000,
            compaction_workers: 2,
            snapshot_retention: 3,
        }
    }
}

impl LogConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RaftLogError::Config(format!("failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RaftLogError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.compaction_threshold == 0 {
            return Err(RaftLogError::InvalidConfig {
                field: "compaction_threshold".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        if self.compaction_workers == 0 {
            return Err(RaftLogError::InvalidConfig {
                field: "compaction_workers".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        if self.snapshot_retention == 0 {
            return Err(RaftLogError::InvalidConfig {
                field: "snapshot_retention".to_string(),
                reason: "at least one snapshot must be retained".to_string(),
            });
        }

        Ok(())
    }
}
