//! Core type definitions for the replicated log.
//!
//! Terms and log indices are signed so the `(-1, -1)` "no previous entry"
//! sentinel used by AppendEntries consistency checks is representable
//! directly; every index actually stored in the log is >= 1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a node in the cluster.
pub type NodeId = u64;

/// Raft term number.
pub type Term = i64;

/// Raft log position.
pub type LogIndex = i64;

/// Identity of a log entry: its `(index, term)` pair.
///
/// By the Log Matching property, two entries with the same id hold the
/// same command and the same prefix, so the pair is a complete identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryId {
    /// Position in the log.
    pub index: LogIndex,
    /// Term under which the entry was created.
    pub term: Term,
}

impl EntryId {
    /// Sentinel meaning "no previous entry" in consistency checks.
    pub const NONE: EntryId = EntryId {
        index: -1,
        term: -1,
    };

    pub fn new(index: LogIndex, term: Term) -> Self {
        Self { index, term }
    }

    /// True for the zero-entry sentinel.
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.index, self.term)
    }
}

/// Cluster membership: node id to address bindings.
///
/// Carried by joint-consensus commands and captured into snapshots so an
/// installed snapshot can restore the configuration wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    members: BTreeMap<NodeId, String>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, address: impl Into<String>) {
        self.members.insert(id, address.into());
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn address(&self, id: NodeId) -> Option<&str> {
        self.members.get(&id).map(String::as_str)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Majority size for this configuration.
    pub fn quorum_size(&self) -> usize {
        self.members.len() / 2 + 1
    }
}

impl FromIterator<(NodeId, String)> for Membership {
    fn from_iter<T: IntoIterator<Item = (NodeId, String)>>(iter: T) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_sentinel() {
        assert!(EntryId::NONE.is_none());
        assert!(!EntryId::new(1, 1).is_none());
        assert_eq!(EntryId::NONE, EntryId::new(-1, -1));
    }

    #[test]
    fn test_membership_quorum() {
        let mut m = Membership::new();
        m.insert(1, "127.0.0.1:9001");
        m.insert(2, "127.0.0.1:9002");
        m.insert(3, "127.0.0.1:9003");

        assert_eq!(m.len(), 3);
        assert_eq!(m.quorum_size(), 2);
        assert!(m.contains(2));
        assert_eq!(m.address(3), Some("127.0.0.1:9003"));
        assert_eq!(m.node_ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
