//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cluster_proxy_exchanges_total` (counter): exchanges by outcome
//! - `cluster_proxy_bytes_forwarded_total` (counter): response bytes sent to clients
//! - `cluster_proxy_backend_connections_total` (counter): backend connections by `opened`/`reused`
//! - `cluster_proxy_buffers_allocated` (gauge): buffers allocated by the pool
//! - `cluster_proxy_node_up` (gauge): 1=up, 0=down, per route
//! - `cluster_proxy_active_connections` (gauge): open client connections

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_exchange(outcome: &'static str) {
    counter!("cluster_proxy_exchanges_total", "outcome" => outcome).increment(1);
}

pub fn record_bytes_forwarded(bytes: u64) {
    counter!("cluster_proxy_bytes_forwarded_total").increment(bytes);
}

pub fn record_backend_connection(kind: &'static str) {
    counter!("cluster_proxy_backend_connections_total", "kind" => kind).increment(1);
}

pub fn record_buffers_allocated(total: usize) {
    gauge!("cluster_proxy_buffers_allocated").set(total as f64);
}

pub fn record_node_status(route: &str, up: bool) {
    gauge!("cluster_proxy_node_up", "route" => route.to_string()).set(if up { 1.0 } else { 0.0 });
}

pub fn record_active_connections(active: u64) {
    gauge!("cluster_proxy_active_connections").set(active as f64);
}
