//! The state machine driven by the replicated log.

use crate::error::Result;

/// User code that committed commands are applied to.
///
/// The log invokes `apply` in strict commit order under its shared lock,
/// so implementations see a deterministic, sequential command stream and
/// need no internal synchronization against the log.
pub trait StateMachine: Send + 'static {
    /// Result of applying a command.
    type Output: Send;

    /// Apply a committed command. Must be deterministic.
    fn apply(&mut self, command: &[u8]) -> Self::Output;

    /// Serialize the full state for a snapshot.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Replace the state from bytes produced by [`serialize`].
    ///
    /// [`serialize`]: StateMachine::serialize
    fn deserialize(&mut self, bytes: &[u8]) -> Result<()>;
}
