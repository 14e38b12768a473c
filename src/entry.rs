//! Log entries and the commands they carry.

use crate::types::{EntryId, LogIndex, Membership, Term};
use serde::{Deserialize, Serialize};

/// A command stored in the log.
///
/// User payloads are opaque bytes; the log never inspects them. Membership
/// changes are first-class variants because they take effect at append
/// time, before commit, per the joint-consensus rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Mutating user command, applied to the state machine on commit.
    Write(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Read-only user command. Never advances the commit index.
    Read(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Barrier entry with no state-machine effect.
    NoOp,
    /// Start a two-phase membership change toward the new bindings.
    EnterJointConsensus(Membership),
    /// Complete a two-phase membership change.
    LeaveJointConsensus,
    /// Synthetic placeholder for an entry subsumed by a snapshot.
    Compacted,
}

impl Command {
    /// True for commands whose side effect runs at append time.
    pub fn is_membership_change(&self) -> bool {
        matches!(
            self,
            Command::EnterJointConsensus(_) | Command::LeaveJointConsensus
        )
    }
}

/// A single entry in the replicated log.
///
/// Identity is the `(index, term)` pair; entries are immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when the entry was received by the leader.
    pub term: Term,
    /// The index of this entry in the log.
    pub index: LogIndex,
    /// The command to replicate.
    pub command: Command,
}

impl LogEntry {
    pub fn new(term: Term, index: LogIndex, command: Command) -> Self {
        Self {
            term,
            index,
            command,
        }
    }

    /// The `(index, term)` identity of this entry.
    pub fn id(&self) -> EntryId {
        EntryId::new(self.index, self.term)
    }
}

/// An AppendEntries request as seen by the log: the previous-entry
/// consistency check, the entries to append, and the leader's commit
/// index. Transport concerns (leader id, term negotiation) live in the
/// consensus module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntries {
    /// Index of the entry immediately preceding `entries`, or -1.
    pub prev_log_index: LogIndex,
    /// Term of the entry at `prev_log_index`, or -1.
    pub prev_log_term: Term,
    /// Entries to store (empty for a pure commit advance).
    pub entries: Vec<LogEntry>,
    /// Leader's commit index.
    pub commit_index: LogIndex,
}

impl AppendEntries {
    pub fn new(prev: EntryId, entries: Vec<LogEntry>, commit_index: LogIndex) -> Self {
        Self {
            prev_log_index: prev.index,
            prev_log_term: prev.term,
            entries,
            commit_index,
        }
    }

    /// The previous-entry id this request asserts.
    pub fn prev(&self) -> EntryId {
        EntryId::new(self.prev_log_index, self.prev_log_term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_identity() {
        let entry = LogEntry::new(2, 7, Command::NoOp);
        assert_eq!(entry.id(), EntryId::new(7, 2));
    }

    #[test]
    fn test_membership_change_detection() {
        assert!(Command::EnterJointConsensus(Membership::new()).is_membership_change());
        assert!(Command::LeaveJointConsensus.is_membership_change());
        assert!(!Command::NoOp.is_membership_change());
        assert!(!Command::Write(vec![1]).is_membership_change());
    }

    #[test]
    fn test_append_entries_prev() {
        let req = AppendEntries::new(EntryId::NONE, Vec::new(), 0);
        assert!(req.prev().is_none());

        let req = AppendEntries::new(EntryId::new(3, 1), Vec::new(), 2);
        assert_eq!(req.prev(), EntryId::new(3, 1));
    }
}
