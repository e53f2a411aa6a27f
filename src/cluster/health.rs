//! Node recovery probing.
//!
//! # Responsibilities
//! - Sleep for the check interval, or until a node is marked DOWN
//! - Probe every DOWN node with a bare TCP connect, restore it on success
//! - Report UP nodes whose election counter stalled since the last cycle

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::cluster::node::Node;
use crate::cluster::registry::NodeRegistry;
use crate::config::HealthCheckConfig;

/// Outcome of one probing cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Routes moved DOWN → UP.
    pub restored: Vec<String>,
    /// UP routes not elected since the previous cycle.
    pub stalled: Vec<String>,
}

pub struct HealthChecker {
    registry: Arc<NodeRegistry>,
    interval: Duration,
    probe_timeout: Duration,
    enabled: bool,
}

impl HealthChecker {
    pub fn new(registry: Arc<NodeRegistry>, config: &HealthCheckConfig) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(config.interval_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            enabled: config.enabled,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.enabled {
            tracing::info!("Health checker disabled");
            return;
        }

        tracing::info!(interval_secs = self.interval.as_secs(), "Health checker starting");

        loop {
            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = self.registry.health_wake().notified() => {
                    tracing::debug!("Health checker woken by node failure");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }

            // Probes started here always finish before shutdown is observed.
            self.check_cycle().await;
        }
    }

    /// Probe DOWN nodes and roll the election counters of UP ones.
    pub async fn check_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for node in self.registry.nodes().iter() {
            if node.is_up() {
                if node.roll_elected() {
                    report.stalled.push(node.route().to_string());
                }
                continue;
            }

            if self.probe(node).await && self.registry.mark_up(node) {
                report.restored.push(node.route().to_string());
            }
        }

        if !report.stalled.is_empty() {
            tracing::debug!(routes = ?report.stalled, "Nodes not elected since last cycle");
        }
        report
    }

    async fn probe(&self, node: &Node) -> bool {
        let address = node.address();
        match time::timeout(self.probe_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => {
                tracing::debug!(node = %node, "Probe succeeded");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(node = %node, error = %e, "Probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(node = %node, "Probe failed: timeout");
                false
            }
        }
    }
}
