//! Process-wide stop broadcast.
//!
//! Fired once, either by an OS signal or when the endpoint finishes
//! draining after an admin `stop`. The health checker, admin API and
//! config reload task all exit on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify every subscriber. Later calls are ignored.
    pub fn trigger(&self, reason: &'static str) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(reason, subscribers = self.tx.receiver_count(), "Shutting down");
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut health = shutdown.subscribe();
        let mut admin = shutdown.subscribe();

        shutdown.trigger("signal");
        assert!(shutdown.is_triggered());
        assert!(health.recv().await.is_ok());
        assert!(admin.recv().await.is_ok());
    }

    #[tokio::test]
    async fn second_trigger_sends_nothing() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        shutdown.trigger("signal");
        shutdown.trigger("endpoint stopped");
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
