//! Snapshots for log compaction.
//!
//! A snapshot captures the serialized state machine, the cluster
//! membership, and the `(index, term)` of the last log entry it covers.
//! Snapshots are immutable once created and subsume every entry at or
//! below their last included index.

use crate::entry::{Command, LogEntry};
use crate::types::{EntryId, LogIndex, Membership, Term};
use serde::{Deserialize, Serialize};

/// A snapshot of the state machine at a specific point in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last log index included in this snapshot.
    pub last_included_index: LogIndex,
    /// Term of the last included log entry.
    pub last_included_term: Term,
    /// Serialized state machine contents.
    #[serde(with = "serde_bytes")]
    pub state: Vec<u8>,
    /// Cluster membership at the time the snapshot was taken.
    pub membership: Membership,
}

impl Snapshot {
    pub fn new(
        last_included_index: LogIndex,
        last_included_term: Term,
        state: Vec<u8>,
        membership: Membership,
    ) -> Self {
        Self {
            last_included_index,
            last_included_term,
            state,
            membership,
        }
    }

    /// Metadata about what this snapshot covers.
    pub fn meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            last_included_index: self.last_included_index,
            last_included_term: self.last_included_term,
        }
    }
}

/// Metadata about what a snapshot covers, kept in memory so coverage
/// checks never deserialize the full state blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
}

impl SnapshotMeta {
    /// Whether this snapshot subsumes the entry identified by `id`.
    pub fn covers(&self, id: EntryId) -> bool {
        self.last_included_index >= id.index && self.last_included_term >= id.term
    }

    /// Synthetic entry standing in for the last log position covered by
    /// the snapshot.
    pub fn placeholder_entry(&self) -> LogEntry {
        LogEntry::new(
            self.last_included_term,
            self.last_included_index,
            Command::Compacted,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage() {
        let meta = SnapshotMeta {
            last_included_index: 10,
            last_included_term: 3,
        };

        assert!(meta.covers(EntryId::new(10, 3)));
        assert!(meta.covers(EntryId::new(5, 2)));
        assert!(!meta.covers(EntryId::new(11, 3)));
        assert!(!meta.covers(EntryId::new(9, 4)));
    }

    #[test]
    fn test_placeholder_entry() {
        let snapshot = Snapshot::new(10, 3, vec![1, 2, 3], Membership::new());
        let entry = snapshot.meta().placeholder_entry();

        assert_eq!(entry.index, 10);
        assert_eq!(entry.term, 3);
        assert_eq!(entry.command, Command::Compacted);
    }
}
