//! Forwarding pipeline.
//!
//! # Data Flow
//! ```text
//! endpoint.rs (accept, TLS, worker task per connection)
//!     → session.rs (read request head, keep-alive loop)
//!     → exchange.rs (select node, borrow connection, forward, relay response)
//!         → pool.rs (per-node idle connections)
//! ```

pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod pool;
pub mod session;

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::cluster::{Node, NodeRegistry};
use crate::config::{BalancerConfig, NodeConfig, TimeoutConfig};

pub use endpoint::{Endpoint, EndpointControl, EndpointError, EndpointState};
pub use error::{ExchangeError, Side, TransportError};
pub use exchange::{Exchange, ExchangeOutcome, ExchangeState, Framing};
pub use pool::{ConnectError, ConnectionManager, PooledConnection};
pub use session::serve_connection;

/// Shared state every exchange works against.
#[derive(Debug)]
pub struct ProxyContext {
    pub registry: Arc<NodeRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub buffers: Arc<BufferPool>,
    pub timeouts: TimeoutConfig,
}

impl ProxyContext {
    /// Add or update a node. A node moved to a new address loses its idle
    /// connections.
    pub fn apply_node(&self, config: NodeConfig) -> Arc<Node> {
        let moved = self
            .registry
            .node(&config.route)
            .filter(|old| old.host() != config.host || old.port() != config.port || old.config().secure != config.secure);
        let node = self.registry.add_or_update_node(config);
        if moved.is_some() {
            let closed = self.connections.remove_node(node.id());
            tracing::info!(node = %node, closed, "Node address changed, idle connections closed");
        }
        node
    }

    /// Remove a node and close its idle connections.
    pub fn remove_node(&self, route: &str) -> Option<Arc<Node>> {
        let node = self.registry.remove_node(route)?;
        self.connections.remove_node(node.id());
        Some(node)
    }

    /// Bring membership in line with a reloaded configuration.
    pub fn reconcile(&self, balancers: &[BalancerConfig], nodes: &[NodeConfig]) {
        for node in nodes {
            let unchanged = self
                .registry
                .node(&node.route)
                .map(|n| n.config() == node)
                .unwrap_or(false);
            if !unchanged {
                self.apply_node(node.clone());
            }
        }
        for removed in self.registry.reconcile(balancers, nodes) {
            self.connections.remove_node(removed.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn context() -> ProxyContext {
        ProxyContext {
            registry: Arc::new(NodeRegistry::new()),
            connections: Arc::new(ConnectionManager::new(Duration::from_secs(1), None)),
            buffers: Arc::new(BufferPool::new(1024)),
            timeouts: TimeoutConfig::default(),
        }
    }

    #[tokio::test]
    async fn moving_a_node_drops_its_idle_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = context();
        let node = ctx.apply_node(NodeConfig::new("a", "127.0.0.1", port));

        let conn = ctx.connections.get_channel(&node).await.unwrap();
        let _accepted = listener.accept().await.unwrap();
        ctx.connections.recycle(&node, conn);
        assert_eq!(ctx.connections.idle_count(node.id()), 1);

        // Same address: pool survives.
        let mut tuned = NodeConfig::new("a", "127.0.0.1", port);
        tuned.load = 10;
        ctx.apply_node(tuned);
        assert_eq!(ctx.connections.idle_count(node.id()), 1);

        ctx.apply_node(NodeConfig::new("a", "127.0.0.1", port.wrapping_add(1)));
        assert_eq!(ctx.connections.idle_count(node.id()), 0);
    }

    #[tokio::test]
    async fn connection_opened_before_a_move_is_not_pooled_after_it() {
        let old_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let old_port = old_listener.local_addr().unwrap().port();
        let new_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let new_port = new_listener.local_addr().unwrap().port();
        let ctx = context();
        let node = ctx.apply_node(NodeConfig::new("a", "127.0.0.1", old_port));

        // Exchange in flight on the old address while the node moves.
        let stale = ctx.connections.get_channel(&node).await.unwrap();
        let _old_side = old_listener.accept().await.unwrap();
        let moved = ctx.apply_node(NodeConfig::new("a", "127.0.0.1", new_port));
        assert_eq!(moved.id(), node.id());

        let fresh = ctx.connections.get_channel(&moved).await.unwrap();
        let _new_side = new_listener.accept().await.unwrap();
        assert_eq!(fresh.address(), format!("127.0.0.1:{new_port}"));

        ctx.connections.recycle(&moved, stale);
        assert_eq!(ctx.connections.idle_count(moved.id()), 0);

        ctx.connections.recycle(&moved, fresh);
        assert_eq!(ctx.connections.idle_count(moved.id()), 1);
        let reused = ctx.connections.get_channel(&moved).await.unwrap();
        assert_eq!(reused.address(), format!("127.0.0.1:{new_port}"));
    }

    #[test]
    fn reconcile_removes_nodes_missing_from_config() {
        let ctx = context();
        ctx.apply_node(NodeConfig::new("a", "127.0.0.1", 9000));
        ctx.apply_node(NodeConfig::new("b", "127.0.0.1", 9001));

        ctx.reconcile(&[], &[NodeConfig::new("b", "127.0.0.1", 9001)]);
        assert!(ctx.registry.node("a").is_none());
        assert!(ctx.registry.node("b").is_some());
    }
}
