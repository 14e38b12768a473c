//! The replicated log core.
//!
//! [`ReplicatedLog`] owns the ordered sequence of replicated commands. It
//! enforces the Raft log rules (previous-entry consistency, idempotent
//! append, monotonic commit), feeds committed commands to the state
//! machine in index order, triggers fixed-size compaction, installs
//! received snapshots, and replays committed entries on startup.

// unwrap() panics here can break consensus.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod compaction;
mod tasks;

use crate::cluster::Cluster;
use crate::config::LogConfig;
use crate::entry::{AppendEntries, Command, LogEntry};
use crate::error::{RaftLogError, Result};
use crate::snapshot::{Snapshot, SnapshotMeta};
use crate::state_machine::StateMachine;
use crate::storage::LogStore;
use crate::types::{EntryId, LogIndex, Membership};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tasks::TaskPool;
use tracing::{debug, info, warn, Instrument};

/// The replicated log, shared between RPC handler threads, the compaction
/// workers, and the joint-consensus worker.
///
/// One reader-writer lock disciplines every operation: appends, commits,
/// reads, and compaction all run in shared mode, relying on the durable
/// store's per-key atomicity and the idempotent insertion rule for
/// correctness; only [`install_snapshot`](Self::install_snapshot) takes
/// the lock exclusively, so no reader can observe a partially installed
/// snapshot. The mutex nested inside the lock serializes state-machine
/// applies without blocking concurrent appends.
pub struct ReplicatedLog<S: StateMachine> {
    config: LogConfig,
    store: Arc<LogStore>,
    cluster: Arc<dyn Cluster>,
    state_machine: Arc<RwLock<Mutex<S>>>,
    /// Coverage of the current snapshot, None before the first one.
    snapshot_meta: Arc<RwLock<Option<SnapshotMeta>>>,
    /// Mirror of the durable commit index.
    commit_index: Arc<AtomicI64>,
    /// Highest index present in the entry map, used to allocate indices.
    last_log: Arc<AtomicI64>,
    /// Gate ensuring at most one compaction runs at a time.
    compacting: Arc<AtomicBool>,
    workers: TaskPool,
}

impl<S: StateMachine> Clone for ReplicatedLog<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            cluster: Arc::clone(&self.cluster),
            state_machine: Arc::clone(&self.state_machine),
            snapshot_meta: Arc::clone(&self.snapshot_meta),
            commit_index: Arc::clone(&self.commit_index),
            last_log: Arc::clone(&self.last_log),
            compacting: Arc::clone(&self.compacting),
            workers: self.workers.clone(),
        }
    }
}

impl<S: StateMachine> ReplicatedLog<S> {
    /// Open the log at `config.data_dir` and recover: load the latest
    /// snapshot into the state machine, re-apply committed entries past
    /// it, and initialize the last-log counter.
    ///
    /// Must be called within a Tokio runtime; background compaction and
    /// joint-consensus work is spawned onto it.
    pub fn open(config: LogConfig, cluster: Arc<dyn Cluster>, state_machine: S) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(LogStore::open(&config.data_dir)?);

        let mut state_machine = state_machine;
        let mut snapshot_meta = None;
        if let Some(snapshot) = store.latest_snapshot()? {
            state_machine.deserialize(&snapshot.state)?;
            cluster.restore_membership(snapshot.membership.clone());
            info!(
                index = snapshot.last_included_index,
                term = snapshot.last_included_term,
                "recovered state machine from snapshot"
            );
            snapshot_meta = Some(snapshot.meta());
        }

        let first = snapshot_meta
            .map(|m| m.last_included_index + 1)
            .unwrap_or(1);
        let target = store.commit_index()?;
        let last_log = store
            .find_last_log_index()?
            .max(snapshot_meta.map(|m| m.last_included_index).unwrap_or(0));

        let workers = TaskPool::new(config.compaction_workers);
        let log = Self {
            config,
            store,
            cluster,
            state_machine: Arc::new(RwLock::new(Mutex::new(state_machine))),
            snapshot_meta: Arc::new(RwLock::new(snapshot_meta)),
            commit_index: Arc::new(AtomicI64::new(target)),
            last_log: Arc::new(AtomicI64::new(last_log)),
            compacting: Arc::new(AtomicBool::new(false)),
            workers,
        };

        log.replay(first, target)?;
        Ok(log)
    }

    /// Handle an AppendEntries request from the leader.
    ///
    /// Returns false when the log contains no entry matching the
    /// request's previous-entry check (and the snapshot does not cover
    /// it). Otherwise appends each supplied entry idempotently, advances
    /// the commit index up to the leader's, and schedules a compaction
    /// evaluation.
    pub fn try_append(&self, request: AppendEntries) -> Result<bool> {
        {
            let env = self.state_machine.read();

            if !self.contains_entry_with(request.prev())? {
                debug!(prev = %request.prev(), "rejecting append: previous entry not found");
                return Ok(false);
            }

            for entry in &request.entries {
                self.insert_entry(entry)?;
            }

            self.commit_entries_until(&env, request.commit_index, false)?;
        }

        self.evaluate_compaction();
        Ok(true)
    }

    /// Append locally created entries (leader side). Does not touch the
    /// commit index.
    pub fn append(&self, entries: &[LogEntry]) -> Result<()> {
        {
            let _env = self.state_machine.read();
            for entry in entries {
                self.insert_entry(entry)?;
            }
        }

        self.evaluate_compaction();
        Ok(())
    }

    /// Whether the log holds an entry with the given identity. True for
    /// the `(-1, -1)` sentinel and for pairs covered by the current
    /// snapshot.
    pub fn contains_entry(&self, id: EntryId) -> Result<bool> {
        let _env = self.state_machine.read();
        self.contains_entry_with(id)
    }

    /// The entry at `index`, if present in the entry map.
    pub fn get_log_entry(&self, index: LogIndex) -> Result<Option<LogEntry>> {
        let _env = self.state_machine.read();
        self.store.entry(index)
    }

    /// The entry immediately preceding `entry`, synthesizing the snapshot
    /// placeholder when the predecessor sits at the snapshot boundary.
    pub fn get_previous_log_entry(&self, entry: &LogEntry) -> Result<Option<LogEntry>> {
        let _env = self.state_machine.read();

        let prev = entry.index - 1;
        if prev < 1 {
            return Ok(None);
        }
        if let Some(found) = self.store.entry(prev)? {
            return Ok(Some(found));
        }

        let meta = *self.snapshot_meta.read();
        Ok(meta
            .filter(|m| m.last_included_index == prev)
            .map(|m| m.placeholder_entry()))
    }

    /// The entry with the highest index. When the snapshot covers the
    /// whole entry map, a synthetic placeholder carrying the snapshot's
    /// last `(index, term)` is returned instead.
    pub fn get_last_log_entry(&self) -> Result<Option<LogEntry>> {
        let _env = self.state_machine.read();

        let last = self.store.last_entry()?;
        let meta = *self.snapshot_meta.read();
        Ok(match (last, meta) {
            (Some(entry), Some(m)) if m.last_included_index >= entry.index => {
                Some(m.placeholder_entry())
            }
            (Some(entry), _) => Some(entry),
            (None, Some(m)) => Some(m.placeholder_entry()),
            (None, None) => None,
        })
    }

    /// Atomically allocate the next log index.
    pub fn next_log_index(&self) -> LogIndex {
        self.last_log.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Max key in the entry map, or 0 when empty. Unlike
    /// [`last_log_index`](Self::last_log_index) this consults the store.
    pub fn find_last_log_index(&self) -> Result<LogIndex> {
        let _env = self.state_machine.read();
        self.store.find_last_log_index()
    }

    /// Current value of the in-process last-log counter.
    pub fn last_log_index(&self) -> LogIndex {
        self.last_log.load(Ordering::Acquire)
    }

    /// Index of the highest committed entry.
    pub fn commit_index(&self) -> LogIndex {
        self.commit_index.load(Ordering::Acquire)
    }

    /// Number of live entries not yet covered by a snapshot.
    pub fn log_size(&self) -> usize {
        let last = self.last_log.load(Ordering::Acquire);
        let covered = (*self.snapshot_meta.read())
            .map(|m| m.last_included_index)
            .unwrap_or(0);
        (last - covered).max(0) as usize
    }

    /// Commit `id` and everything before it.
    ///
    /// Fails with [`MissingLogEntry`] when the entry is absent: a hole in
    /// the log. Refuses (with a warning, not an error) when the entry's
    /// term is not the cluster's current term, since a leader may only
    /// commit entries from its own term.
    ///
    /// [`MissingLogEntry`]: RaftLogError::MissingLogEntry
    pub fn commit(&self, id: EntryId) -> Result<()> {
        let env = self.state_machine.read();

        let entry = self
            .store
            .entry(id.index)?
            .ok_or(RaftLogError::MissingLogEntry(id.index))?;

        let local_term = self.cluster.local_term();
        if entry.term != local_term {
            warn!(
                index = entry.index,
                term = entry.term,
                local_term,
                "refusing to commit entry from a stale term"
            );
            return Ok(());
        }

        self.commit_entries_until(&env, entry.index, true)?;
        self.safe_commit_at(&env, entry.index)
    }

    /// Execute a command against the state machine without going through
    /// the commit path. Read commands never advance the commit index.
    pub fn execute(&self, command: &Command) -> Result<Option<S::Output>> {
        let env = self.state_machine.read();
        self.execute_with(&env, command)
    }

    /// Atomically replace the log's view of the world with a received
    /// snapshot: persist it, load it into the state machine, move the
    /// commit index to its last included index, and restore membership.
    ///
    /// Runs under the exclusive lock; every other operation waits, so the
    /// four effects become visible together.
    pub fn install_snapshot(&self, snapshot: Snapshot) -> Result<bool> {
        let mut env = self.state_machine.write();

        self.store
            .put_snapshot(&snapshot, self.config.snapshot_retention)?;
        env.get_mut().deserialize(&snapshot.state)?;
        self.store.set_commit_index(snapshot.last_included_index)?;
        self.commit_index
            .store(snapshot.last_included_index, Ordering::Release);
        self.cluster.restore_membership(snapshot.membership.clone());
        *self.snapshot_meta.write() = Some(snapshot.meta());

        let last = self
            .store
            .find_last_log_index()?
            .max(snapshot.last_included_index);
        self.last_log.store(last, Ordering::SeqCst);

        info!(
            index = snapshot.last_included_index,
            term = snapshot.last_included_term,
            "installed snapshot"
        );
        Ok(true)
    }

    /// Re-apply committed entries past the snapshot on startup.
    fn replay(&self, first: LogIndex, target: LogIndex) -> Result<()> {
        if first > target {
            return Ok(());
        }
        info!(first, target, "replaying committed entries");

        let env = self.state_machine.read();
        for index in first..=target {
            let entry = self
                .store
                .entry(index)?
                .ok_or(RaftLogError::MissingLogEntry(index))?;

            if entry.command.is_membership_change() {
                self.cluster.apply_membership(&entry.command);
            }
            self.execute_with(&env, &entry.command)?;
        }
        Ok(())
    }

    fn contains_entry_with(&self, id: EntryId) -> Result<bool> {
        if id.is_none() {
            return Ok(true);
        }
        if let Some(meta) = *self.snapshot_meta.read() {
            if meta.covers(id) {
                return Ok(true);
            }
        }
        Ok(self
            .store
            .entry(id.index)?
            .map_or(false, |e| e.term == id.term))
    }

    /// Idempotent insertion: a second append of the same `(index, term)`
    /// is discarded; an entry at the same index with a different term
    /// truncates the conflicting suffix first. Membership-change commands
    /// take effect here, at append time.
    fn insert_entry(&self, entry: &LogEntry) -> Result<()> {
        match self.store.entry(entry.index)? {
            Some(existing) if existing.term == entry.term => {
                warn!(
                    index = entry.index,
                    term = entry.term,
                    "discarding duplicate append"
                );
                return Ok(());
            }
            Some(existing) => {
                warn!(
                    index = entry.index,
                    existing_term = existing.term,
                    term = entry.term,
                    "conflicting entry, truncating suffix"
                );
                self.store.truncate_from(entry.index)?;
                self.last_log.store(entry.index - 1, Ordering::SeqCst);
            }
            None => {}
        }

        self.store.put_entry(entry)?;
        self.last_log.fetch_max(entry.index, Ordering::SeqCst);

        if entry.command.is_membership_change() {
            self.cluster.apply_membership(&entry.command);
        }
        Ok(())
    }

    /// Walk `commitIndex + 1 ..` up to `target` (or `target - 1` when
    /// `exclusive`), committing each present entry. Absent intermediate
    /// indices are tolerated: the cluster supplies them through later
    /// append streams.
    fn commit_entries_until(
        &self,
        sm: &Mutex<S>,
        target: LogIndex,
        exclusive: bool,
    ) -> Result<()> {
        let end = if exclusive { target - 1 } else { target };
        let end = end.min(self.last_log.load(Ordering::Acquire));

        let mut index = self.commit_index.load(Ordering::Acquire) + 1;
        while index <= end {
            self.safe_commit_at(sm, index)?;
            index += 1;
        }
        Ok(())
    }

    /// Commit the entry at `index` if it exists and is newer than the
    /// current commit index, then execute its command. The commit index
    /// becomes durable before the command runs; recovery replays from it.
    fn safe_commit_at(&self, sm: &Mutex<S>, index: LogIndex) -> Result<()> {
        let Some(entry) = self.store.entry(index)? else {
            debug!(index, "skipping commit for absent entry");
            return Ok(());
        };

        if index <= self.commit_index.load(Ordering::Acquire) {
            debug!(index, "ignoring stale commit request");
            return Ok(());
        }

        self.store.set_commit_index(index)?;
        self.commit_index.store(index, Ordering::Release);
        self.execute_with(sm, &entry.command)?;
        Ok(())
    }

    fn execute_with(&self, sm: &Mutex<S>, command: &Command) -> Result<Option<S::Output>> {
        match command {
            Command::NoOp | Command::Compacted => Ok(None),
            // The configuration became active on append; completion needs
            // no state-machine effect.
            Command::LeaveJointConsensus => Ok(None),
            Command::EnterJointConsensus(bindings) => {
                self.schedule_joint_majority(bindings.clone());
                Ok(None)
            }
            Command::Write(data) | Command::Read(data) => Ok(Some(sm.lock().apply(data))),
        }
    }

    /// Ask the cluster, off-thread, to drive the joint configuration to
    /// majority. Failure is logged and swallowed: the replication path
    /// retries through normal append traffic.
    fn schedule_joint_majority(&self, bindings: Membership) {
        debug!(
            nodes = ?bindings.node_ids().collect::<Vec<_>>(),
            "scheduling joint consensus follow-up"
        );
        let cluster = Arc::clone(&self.cluster);
        let span = cluster.span();
        let accepted = self.workers.try_spawn(
            "joint-consensus",
            async move {
                if let Err(e) = cluster.reach_joint_majority(bindings).await {
                    warn!(error = %e, "joint consensus follow-up failed");
                }
            }
            .instrument(span),
        );

        if !accepted {
            warn!("worker pool saturated, joint consensus deferred to replication retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::atomic::AtomicI64;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingStateMachine {
        applied: Vec<Vec<u8>>,
    }

    impl StateMachine for RecordingStateMachine {
        type Output = usize;

        fn apply(&mut self, command: &[u8]) -> Self::Output {
            self.applied.push(command.to_vec());
            self.applied.len()
        }

        fn serialize(&self) -> Result<Vec<u8>> {
            Ok(bincode::serialize(&self.applied)?)
        }

        fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
            self.applied = bincode::deserialize(bytes)?;
            Ok(())
        }
    }

    struct StaticCluster {
        term: AtomicI64,
    }

    impl StaticCluster {
        fn new(term: i64) -> Arc<Self> {
            Arc::new(Self {
                term: AtomicI64::new(term),
            })
        }
    }

    #[async_trait::async_trait]
    impl Cluster for StaticCluster {
        fn local_term(&self) -> i64 {
            self.term.load(Ordering::SeqCst)
        }

        fn apply_membership(&self, _command: &Command) {}

        fn membership(&self) -> Membership {
            Membership::new()
        }

        fn restore_membership(&self, _membership: Membership) {}

        async fn reach_joint_majority(&self, _bindings: Membership) -> Result<()> {
            Ok(())
        }
    }

    fn config(dir: &std::path::Path) -> LogConfig {
        LogConfig {
            data_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_fresh_log() {
        let dir = tempdir().unwrap();
        let log = ReplicatedLog::open(
            config(dir.path()),
            StaticCluster::new(1),
            RecordingStateMachine::default(),
        )
        .unwrap();

        assert_eq!(log.commit_index(), 0);
        assert_eq!(log.last_log_index(), 0);
        assert!(log.get_last_log_entry().unwrap().is_none());
        assert!(log.contains_entry(EntryId::NONE).unwrap());
        assert!(!log.contains_entry(EntryId::new(1, 1)).unwrap());
    }

    #[tokio::test]
    async fn test_next_log_index_is_dense() {
        let dir = tempdir().unwrap();
        let log = ReplicatedLog::open(
            config(dir.path()),
            StaticCluster::new(1),
            RecordingStateMachine::default(),
        )
        .unwrap();

        assert_eq!(log.next_log_index(), 1);
        assert_eq!(log.next_log_index(), 2);
        assert_eq!(log.last_log_index(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_term_truncates_suffix() {
        let dir = tempdir().unwrap();
        let log = ReplicatedLog::open(
            config(dir.path()),
            StaticCluster::new(2),
            RecordingStateMachine::default(),
        )
        .unwrap();

        log.append(&[
            LogEntry::new(1, 1, Command::NoOp),
            LogEntry::new(1, 2, Command::Write(vec![1])),
            LogEntry::new(1, 3, Command::Write(vec![2])),
        ])
        .unwrap();

        // A new leader overwrites index 2 with a different term; the old
        // suffix must disappear.
        log.append(&[LogEntry::new(2, 2, Command::Write(vec![9]))])
            .unwrap();

        assert_eq!(log.last_log_index(), 2);
        assert!(log.get_log_entry(3).unwrap().is_none());
        assert_eq!(log.get_log_entry(2).unwrap().unwrap().term, 2);
    }
}
