//! Fixed-size compaction policy.
//!
//! Every append path re-evaluates the policy: once the number of live
//! entries reaches the configured threshold, one compaction task is
//! dispatched to the worker pool. The `compacting` flag guarantees at
//! most one concurrent compaction; a rejected dispatch simply releases
//! the flag and waits for the next append to try again.

use super::ReplicatedLog;
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::state_machine::StateMachine;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

impl<S: StateMachine> ReplicatedLog<S> {
    /// Dispatch a compaction if the log has grown past the threshold and
    /// none is already running. Never blocks the caller.
    pub(super) fn evaluate_compaction(&self) {
        if self.log_size() < self.config.compaction_threshold {
            return;
        }

        if self
            .compacting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("compaction already in flight");
            return;
        }

        let this = self.clone();
        let span = self.cluster.span();
        let dispatched = self.workers.try_spawn_blocking("compaction", move || {
            let _guard = span.enter();
            if let Err(e) = this.compact_once() {
                warn!(error = %e, "log compaction failed");
            }
            this.compacting.store(false, Ordering::Release);
        });

        // The flag must never stay set without a task owning it.
        if !dispatched {
            self.compacting.store(false, Ordering::Release);
        }
    }

    /// Snapshot the committed state and prune the entries it covers.
    fn compact_once(&self) -> Result<()> {
        let env = self.state_machine.read();

        let commit = self.commit_index.load(Ordering::Acquire);
        let covered = (*self.snapshot_meta.read())
            .map(|m| m.last_included_index)
            .unwrap_or(0);
        if commit <= covered {
            debug!(commit, covered, "nothing new to compact");
            return Ok(());
        }

        let Some(entry) = self.store.entry(commit)? else {
            debug!(commit, "commit index entry not present, skipping compaction");
            return Ok(());
        };

        let state = env.lock().serialize()?;
        let snapshot = Snapshot::new(commit, entry.term, state, self.cluster.membership());

        self.store
            .put_snapshot(&snapshot, self.config.snapshot_retention)?;
        *self.snapshot_meta.write() = Some(snapshot.meta());
        self.store.prune_until(commit)?;

        info!(
            index = commit,
            term = entry.term,
            "compacted log into snapshot"
        );
        Ok(())
    }
}
