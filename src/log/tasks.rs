//! Bounded worker pool for background log work.
//!
//! Compaction and joint-consensus follow-ups run off the request thread
//! on a pool whose capacity is deliberately small. Hand-off is
//! synchronous: a submission above capacity is rejected immediately
//! rather than queued, which is benign for both users (the next append
//! re-evaluates compaction; the replication path retries joint
//! consensus).

use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Clone)]
pub(crate) struct TaskPool {
    permits: Arc<Semaphore>,
    handle: Handle,
}

impl TaskPool {
    /// Create a pool bound to the current Tokio runtime.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            handle: Handle::current(),
        }
    }

    /// Spawn an async task if a worker slot is free. Returns false when
    /// the pool is saturated.
    pub(crate) fn try_spawn<F>(&self, label: &'static str, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            debug!(task = label, "worker pool saturated, rejecting task");
            return false;
        };
        self.handle.spawn(async move {
            fut.await;
            drop(permit);
        });
        true
    }

    /// Spawn a blocking task if a worker slot is free. Returns false when
    /// the pool is saturated.
    pub(crate) fn try_spawn_blocking<F>(&self, label: &'static str, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            debug!(task = label, "worker pool saturated, rejecting task");
            return false;
        };
        self.handle.spawn_blocking(move || {
            f();
            drop(permit);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_above_capacity() {
        let pool = TaskPool::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        let gate = Arc::new(Semaphore::new(0));
        let (gate2, ran2) = (Arc::clone(&gate), Arc::clone(&ran));
        assert!(pool.try_spawn("first", async move {
            let _ = gate2.acquire().await;
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        // Pool of one: the second submission must be rejected while the
        // first task is still holding the slot.
        let ran3 = Arc::clone(&ran);
        assert!(!pool.try_spawn("second", async move {
            ran3.fetch_add(1, Ordering::SeqCst);
        }));

        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        // Slot released: submissions are accepted again.
        let ran4 = Arc::clone(&ran);
        assert!(pool.try_spawn("third", async move {
            ran4.fetch_add(1, Ordering::SeqCst);
        }));
    }
}
