//! Error types for the replicated log.
//!
//! A single [`RaftLogError`] covers all operations, with a [`Result`]
//! alias. Note that two of the failure modes from the log's contract are
//! deliberately *not* errors: a duplicate append and a stale-term commit
//! are logged and treated as success, since the replication protocol
//! retries through the normal append stream.

use crate::types::LogIndex;
use std::io;
use thiserror::Error;

/// Main error type for replicated-log operations.
#[derive(Error, Debug)]
pub enum RaftLogError {
    /// A commit was requested for an index that should exist but does not.
    /// This indicates a hole in the log: a bug or data corruption.
    #[error("missing log entry at index {0}")]
    MissingLogEntry(LogIndex),

    /// The joint configuration could not be acknowledged by a majority.
    /// The replication path will retry; callers log and move on.
    #[error("no majority reached for joint consensus: got {got}, need {need}")]
    NoMajorityReached { got: usize, need: usize },

    #[error("state machine error: {0}")]
    StateMachine(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RaftLogError {
    /// True for errors that indicate a corrupted or inconsistent log
    /// rather than a transient condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RaftLogError::MissingLogEntry(_) | RaftLogError::Storage(_)
        )
    }

    /// True for errors the replication layer is expected to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RaftLogError::NoMajorityReached { .. })
    }
}

impl From<rocksdb::Error> for RaftLogError {
    fn from(e: rocksdb::Error) -> Self {
        RaftLogError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for RaftLogError {
    fn from(e: bincode::Error) -> Self {
        RaftLogError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RaftLogError {
    fn from(e: serde_json::Error) -> Self {
        RaftLogError::Serialization(e.to_string())
    }
}

/// Result type alias for replicated-log operations.
pub type Result<T> = std::result::Result<T, RaftLogError>;
