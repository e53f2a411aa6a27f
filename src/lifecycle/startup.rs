//! Startup orchestration.
//!
//! Builds the shared data-plane state from a validated configuration, in
//! dependency order: buffers, registry, backend connections.

use std::sync::Arc;

use thiserror::Error;

use crate::buffer::BufferPool;
use crate::cluster::NodeRegistry;
use crate::config::ProxyConfig;
use crate::net::{tls, TlsError};
use crate::proxy::{ConnectionManager, ProxyContext};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("backend TLS: {0}")]
    BackendTls(#[from] TlsError),
}

/// Build the context shared by the endpoint, health checker and admin API.
pub fn build_context(config: &ProxyConfig) -> Result<Arc<ProxyContext>, StartupError> {
    let buffers = Arc::new(BufferPool::new(config.buffers.buffer_size));

    let registry = Arc::new(NodeRegistry::from_config(&config.balancers, &config.nodes));
    tracing::info!(
        nodes = config.nodes.len(),
        balancers = registry.balancers().len(),
        "Node registry initialized"
    );

    let connector = config
        .backend_tls
        .ca_path
        .as_deref()
        .map(tls::load_connector)
        .transpose()?;
    if connector.is_none() && config.nodes.iter().any(|n| n.secure) {
        tracing::warn!("Secure nodes configured without backend_tls.ca_path, their connects will fail");
    }
    let connections = Arc::new(ConnectionManager::new(config.timeouts.connect(), connector));

    Ok(Arc::new(ProxyContext {
        registry,
        connections,
        buffers,
        timeouts: config.timeouts.clone(),
    }))
}
