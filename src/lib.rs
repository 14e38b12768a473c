//! raftlog - the replicated log core of a Raft-based consensus library.
//!
//! This crate owns the ordered sequence of replicated commands for a Raft
//! node: it enforces the log safety rules, commits entries against a
//! user-supplied state machine, compacts the log into snapshots, installs
//! snapshots received from a leader, and recovers state on startup.
//! Leader election, vote counting, and network transport belong to the
//! consensus module, which the log reaches through the [`Cluster`] trait.
//!
//! # Architecture
//!
//! ```text
//! RPC handlers ──> ReplicatedLog ──> StateMachine
//!                     │    ▲
//!          compaction │    │ snapshots, joint consensus
//!                     ▼    │
//!                  LogStore (RocksDB)          Cluster (injected)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use raftlog::{Command, LogConfig, LogEntry, ReplicatedLog};
//! # use raftlog::{Cluster, StateMachine};
//! # use std::sync::Arc;
//! # fn wire(cluster: Arc<dyn Cluster>, machine: impl StateMachine) -> raftlog::Result<()> {
//! # let rt = tokio::runtime::Runtime::new()?;
//! # rt.block_on(async {
//! let log = ReplicatedLog::open(LogConfig::default(), cluster, machine)?;
//!
//! let index = log.next_log_index();
//! let entry = LogEntry::new(1, index, Command::Write(b"set x=1".to_vec()));
//! log.append(std::slice::from_ref(&entry))?;
//! log.commit(entry.id())?;
//! # Ok(())
//! # })
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod entry;
pub mod error;
pub mod log;
pub mod snapshot;
pub mod state_machine;
pub mod storage;
pub mod types;

pub use cluster::Cluster;
pub use config::LogConfig;
pub use entry::{AppendEntries, Command, LogEntry};
pub use error::{RaftLogError, Result};
pub use log::ReplicatedLog;
pub use snapshot::{Snapshot, SnapshotMeta};
pub use state_machine::StateMachine;
pub use storage::LogStore;
pub use types::{EntryId, LogIndex, Membership, NodeId, Term};
