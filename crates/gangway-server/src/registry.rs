//! Connection registry and drain coordinator.
//!
//! The registry tracks every live connection in a worker, classifies each
//! as idle or busy, and runs the shutdown drain protocol: idle connections
//! close immediately, busy ones get a bounded number of one-interval
//! grace periods, and whatever is still busy after that is force-cancelled.
//!
//! The registry holds weak handles only — it never constructs or destroys
//! connections; the front door registers on accept and unregisters on
//! close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

/// Control surface the registry needs from a connection.
///
/// Implemented by the multiplexed transport bridge and by the legacy
/// connection bookkeeping.
pub trait ConnectionControl: Send + Sync + 'static {
    /// Returns `true` when the connection has no in-flight stream sessions.
    fn pipeline_empty(&self) -> bool;

    /// Closes the connection's transport. Must be idempotent.
    fn close_transport(&self);

    /// Force-cancels every in-flight stream session on this connection.
    ///
    /// Cancellation reaches each application task at its next suspension
    /// point; session cleanup still runs.
    fn cancel_sessions(&self);
}

/// Identifier handed out on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Tracks the live connections of one worker.
///
/// # Example
///
/// ```rust,ignore
/// let registry = ConnectionRegistry::new();
/// let id = registry.register(connection.clone());
/// // ... connection closes ...
/// registry.unregister(id);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Weak<dyn ConnectionControl>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection; returns the id to unregister with.
    pub fn register(&self, conn: Arc<dyn ConnectionControl>) -> ConnectionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live.lock().insert(id, Arc::downgrade(&conn));
        ConnectionId(id)
    }

    /// Unregisters a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: ConnectionId) {
        self.inner.live.lock().remove(&id.0);
    }

    /// Returns the number of registered connections still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .live
            .lock()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Returns `true` when no live connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes a point-in-time idle/busy snapshot.
    ///
    /// Snapshot lists avoid mutation-during-iteration hazards: entries for
    /// dropped connections are pruned here rather than iterated live.
    fn classify(&self) -> (Vec<Arc<dyn ConnectionControl>>, Vec<Arc<dyn ConnectionControl>>) {
        let mut live = self.inner.live.lock();
        let mut idle = Vec::new();
        let mut busy = Vec::new();

        live.retain(|_, weak| match weak.upgrade() {
            Some(conn) => {
                if conn.pipeline_empty() {
                    idle.push(conn);
                } else {
                    busy.push(conn);
                }
                true
            }
            None => false,
        });

        (idle, busy)
    }

    /// Runs the drain protocol.
    ///
    /// 1. Closes every currently-idle connection's transport immediately.
    /// 2. Returns at once when nothing was idle and nothing is busy.
    /// 3. Re-classifies up to `retries` times, once per `interval`, closing
    ///    newly-idle connections and stopping early once nothing is busy.
    /// 4. Force-cancels the in-flight sessions of every connection still
    ///    busy after the retry budget, exactly once per connection.
    ///
    /// A second invocation that finds no idle and no busy connections is a
    /// no-op that returns immediately.
    pub async fn drain(&self, retries: u32, interval: Duration) {
        let (idle, busy) = self.classify();
        for conn in &idle {
            conn.close_transport();
        }

        if idle.is_empty() && busy.is_empty() {
            return;
        }

        tracing::info!(
            idle = idle.len(),
            busy = busy.len(),
            "draining connections"
        );

        let mut still_busy = !busy.is_empty();
        if still_busy {
            for remaining in (1..=retries).rev() {
                tokio::time::sleep(interval).await;

                let (idle, busy) = self.classify();
                for conn in &idle {
                    conn.close_transport();
                }
                if busy.is_empty() {
                    still_busy = false;
                    break;
                }
                tracing::info!(
                    retries_remaining = remaining - 1,
                    busy = busy.len(),
                    "connections still busy"
                );
            }
        }

        if still_busy {
            let (_, busy) = self.classify();
            if !busy.is_empty() {
                tracing::warn!(busy = busy.len(), "force-cancelling busy connections");
                for conn in busy {
                    conn.cancel_sessions();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::time::Instant;

    #[derive(Default)]
    struct MockConnection {
        empty: AtomicBool,
        closed: AtomicUsize,
        cancelled: AtomicUsize,
    }

    impl MockConnection {
        fn idle() -> Arc<Self> {
            let conn = Self::default();
            conn.empty.store(true, Ordering::SeqCst);
            Arc::new(conn)
        }

        fn busy() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn closed_count(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        fn cancelled_count(&self) -> usize {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    impl ConnectionControl for MockConnection {
        fn pipeline_empty(&self) -> bool {
            self.empty.load(Ordering::SeqCst)
        }

        fn close_transport(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel_sessions(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_registry_drain_is_noop() {
        let registry = ConnectionRegistry::new();
        let start = Instant::now();
        registry.drain(5, Duration::from_secs(1)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connections_close_in_first_step() {
        let registry = ConnectionRegistry::new();
        let conn = MockConnection::idle();
        registry.register(conn.clone());

        let start = Instant::now();
        registry.drain(5, Duration::from_secs(1)).await;

        assert_eq!(conn.closed_count(), 1);
        assert_eq!(conn.cancelled_count(), 0);
        // No busy connections, so no multi-second wait.
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_connection_cancelled_after_retries() {
        let registry = ConnectionRegistry::new();
        let conn = MockConnection::busy();
        registry.register(conn.clone());

        let start = Instant::now();
        registry.drain(5, Duration::from_secs(1)).await;

        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(conn.cancelled_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_turning_idle_escapes_cancellation() {
        let registry = ConnectionRegistry::new();
        let conn = MockConnection::busy();
        registry.register(conn.clone());

        let flag = conn.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            flag.empty.store(true, Ordering::SeqCst);
        });

        registry.drain(5, Duration::from_secs(1)).await;

        // Closed as newly-idle during a retry; never cancelled.
        assert_eq!(conn.closed_count(), 1);
        assert_eq!(conn.cancelled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_idle_and_busy() {
        let registry = ConnectionRegistry::new();
        let idle = MockConnection::idle();
        let busy = MockConnection::busy();
        registry.register(idle.clone());
        registry.register(busy.clone());

        registry.drain(5, Duration::from_secs(1)).await;

        assert_eq!(idle.closed_count(), 1);
        assert_eq!(idle.cancelled_count(), 0);
        assert_eq!(busy.cancelled_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_idempotent() {
        let registry = ConnectionRegistry::new();
        let conn = MockConnection::idle();
        let id = registry.register(conn.clone());

        registry.drain(5, Duration::from_secs(1)).await;
        assert_eq!(conn.closed_count(), 1);

        // The front door unregisters the connection once its transport
        // reports closed; the second drain then finds nothing to do.
        registry.unregister(id);
        let start = Instant::now();
        registry.drain(5, Duration::from_secs(1)).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(conn.closed_count(), 1);
        assert_eq!(conn.cancelled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let conn = MockConnection::idle();
        registry.register(conn.clone());
        assert_eq!(registry.len(), 1);

        drop(conn);
        assert_eq!(registry.len(), 0);

        let start = Instant::now();
        registry.drain(5, Duration::from_secs(1)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_register_unregister() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        let conn = MockConnection::idle();
        let id = registry.register(conn.clone());
        assert_eq!(registry.len(), 1);

        registry.unregister(id);
        assert!(registry.is_empty());
    }
}
