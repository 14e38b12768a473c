//! The consensus-module collaborator contract.
//!
//! The log and the cluster reference each other: the log activates
//! membership commands on append and asks the cluster to drive a joint
//! configuration to majority, while the cluster feeds the log with
//! AppendEntries and commit requests. The cycle is broken by having the
//! log consume this trait; concrete wiring is injected at construction.

use crate::entry::Command;
use crate::error::Result;
use crate::types::{Membership, Term};

/// Operations the replicated log requires of the consensus module.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    /// The node's current term.
    fn local_term(&self) -> Term;

    /// Activate a membership-change command. Invoked at append time, not
    /// commit time, and exactly once per `(index, term)`.
    fn apply_membership(&self, command: &Command);

    /// Current cluster membership, captured into snapshots.
    fn membership(&self) -> Membership;

    /// Replace the membership wholesale from an installed snapshot.
    fn restore_membership(&self, membership: Membership);

    /// Drive the joint configuration to majority acknowledgement. May
    /// fail with [`NoMajorityReached`]; the caller logs and relies on the
    /// replication path to retry.
    ///
    /// [`NoMajorityReached`]: crate::error::RaftLogError::NoMajorityReached
    async fn reach_joint_majority(&self, bindings: Membership) -> Result<()>;

    /// Span scoping background work executed on behalf of this cluster.
    /// Compaction and joint-consensus tasks run inside it.
    fn span(&self) -> tracing::Span {
        tracing::Span::none()
    }
}
