//! Open client connection accounting.
//!
//! Every accepted client holds a [`ConnectionGuard`] for as long as its
//! worker task runs. A stopping endpoint waits on the tracker until the
//! last guard is gone or the drain timeout expires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique client connection number, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Shared {
    open: AtomicU64,
    drained: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    shared: Arc<Shared>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self) -> ConnectionGuard {
        let open = self.shared.open.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(open);
        ConnectionGuard {
            shared: Arc::clone(&self.shared),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Resolves true once no guard is alive, false if `timeout` hits first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                // Register before the check so a drop in between is not missed.
                let notified = self.shared.drained.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    shared: Arc<Shared>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let open = self.shared.open.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(open);
        if open == 0 {
            self.shared.drained.notify_waiters();
        }
    }
}
