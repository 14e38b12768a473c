//! Shared fixtures for replicated-log integration tests.

use parking_lot::Mutex;
use raftlog::error::Result;
use raftlog::{Cluster, Command, LogConfig, Membership, RaftLogError, StateMachine, Term};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a tracing subscriber once per test binary. `RUST_LOG` controls
/// verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// State machine whose applied-command history is observable from the
/// test through a shared handle.
#[derive(Clone, Default)]
pub struct RecordingStateMachine {
    inner: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingStateMachine {
    pub fn applied(&self) -> Vec<Vec<u8>> {
        self.inner.lock().clone()
    }
}

impl StateMachine for RecordingStateMachine {
    type Output = usize;

    fn apply(&mut self, command: &[u8]) -> Self::Output {
        let mut inner = self.inner.lock();
        inner.push(command.to_vec());
        inner.len()
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&*self.inner.lock())?)
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        *self.inner.lock() = bincode::deserialize(bytes)?;
        Ok(())
    }
}

/// Consensus-module stand-in recording every interaction the log makes.
pub struct MockCluster {
    term: AtomicI64,
    membership: Mutex<Membership>,
    membership_queries: AtomicUsize,
    fail_majority: AtomicBool,
    pub membership_commands: Mutex<Vec<Command>>,
    pub majority_requests: Mutex<Vec<Membership>>,
    pub restored: Mutex<Vec<Membership>>,
}

impl MockCluster {
    pub fn new(term: Term) -> Arc<Self> {
        Arc::new(Self {
            term: AtomicI64::new(term),
            membership: Mutex::new(Membership::new()),
            membership_queries: AtomicUsize::new(0),
            fail_majority: AtomicBool::new(false),
            membership_commands: Mutex::new(Vec::new()),
            majority_requests: Mutex::new(Vec::new()),
            restored: Mutex::new(Vec::new()),
        })
    }

    pub fn set_term(&self, term: Term) {
        self.term.store(term, Ordering::SeqCst);
    }

    pub fn fail_majority(&self) {
        self.fail_majority.store(true, Ordering::SeqCst);
    }

    /// How many times the log asked for the current membership; the
    /// compactor queries it once per snapshot it builds.
    pub fn membership_queries(&self) -> usize {
        self.membership_queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Cluster for MockCluster {
    fn local_term(&self) -> Term {
        self.term.load(Ordering::SeqCst)
    }

    fn apply_membership(&self, command: &Command) {
        if let Command::EnterJointConsensus(bindings) = command {
            *self.membership.lock() = bindings.clone();
        }
        self.membership_commands.lock().push(command.clone());
    }

    fn membership(&self) -> Membership {
        self.membership_queries.fetch_add(1, Ordering::SeqCst);
        self.membership.lock().clone()
    }

    fn restore_membership(&self, membership: Membership) {
        *self.membership.lock() = membership.clone();
        self.restored.lock().push(membership);
    }

    async fn reach_joint_majority(&self, bindings: Membership) -> Result<()> {
        let need = bindings.quorum_size();
        self.majority_requests.lock().push(bindings);
        if self.fail_majority.load(Ordering::SeqCst) {
            return Err(RaftLogError::NoMajorityReached { got: 1, need });
        }
        Ok(())
    }
}

pub fn config(dir: &Path) -> LogConfig {
    init_tracing();
    LogConfig {
        data_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn three_nodes() -> Membership {
    [
        (1, "127.0.0.1:9001".to_string()),
        (2, "127.0.0.1:9002".to_string()),
        (3, "127.0.0.1:9003".to_string()),
    ]
    .into_iter()
    .collect()
}
