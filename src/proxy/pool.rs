//! Per-node backend connection pools.
//!
//! # Responsibilities
//! - Hand out an idle connection for a node, or open a new one
//! - Take connections back only while the transport is still open
//! - Drop a node's idle connections when the node is removed
//!
//! Pools are unbounded and idle connections never expire; a connection that
//! the backend closed is discarded when it is next popped.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{TlsConnector, TlsStream};

use crate::cluster::{Node, NodeProtocol};
use crate::net::Stream;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {address} failed: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect to {address} timed out")]
    Timeout { address: String },
    #[error("TLS handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TLS server name '{0}'")]
    ServerName(String),
    #[error("secure node '{0}' requires backend_tls.ca_path")]
    NoTrustRoots(String),
}

/// A backend connection owned either by a node's idle queue or by one exchange.
#[derive(Debug)]
pub struct PooledConnection {
    node_id: u64,
    route: String,
    address: String,
    protocol: NodeProtocol,
    stream: Stream,
    reused: bool,
}

impl PooledConnection {
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// `host:port` the connection was opened to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// True when this connection came out of the idle pool.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn stream(&mut self) -> &mut Stream {
        &mut self.stream
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }
}

pub struct ConnectionManager {
    idle: DashMap<u64, Arc<SegQueue<PooledConnection>>>,
    connect_timeout: Duration,
    tls: Option<TlsConnector>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("nodes", &self.idle.len())
            .field("idle", &self.total_idle())
            .field("connect_timeout", &self.connect_timeout)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(connect_timeout: Duration, tls: Option<TlsConnector>) -> Self {
        Self {
            idle: DashMap::new(),
            connect_timeout,
            tls,
        }
    }

    fn queue(&self, node_id: u64) -> Arc<SegQueue<PooledConnection>> {
        Arc::clone(self.idle.entry(node_id).or_default().value())
    }

    /// Pop an idle connection for `node`, or open a new one.
    pub async fn get_channel(&self, node: &Node) -> Result<PooledConnection, ConnectError> {
        let queue = self.queue(node.id());
        while let Some(mut conn) = queue.pop() {
            if conn.is_open() {
                conn.reused = true;
                metrics::record_backend_connection("reused");
                tracing::trace!(node = %node, "Reusing pooled backend connection");
                return Ok(conn);
            }
            tracing::debug!(node = %node, "Discarding closed pooled connection");
        }

        let stream = self.open(node).await?;
        metrics::record_backend_connection("opened");
        tracing::debug!(node = %node, tls = stream.is_tls(), "Opened backend connection");
        Ok(PooledConnection {
            node_id: node.id(),
            route: node.route().to_string(),
            address: node.address(),
            protocol: node.protocol(),
            stream,
            reused: false,
        })
    }

    async fn open(&self, node: &Node) -> Result<Stream, ConnectError> {
        let address = node.address();
        let tcp = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(source)) => return Err(ConnectError::Io { address, source }),
            Err(_) => return Err(ConnectError::Timeout { address }),
        };
        if let Err(e) = tcp.set_nodelay(node.config().flush_packets) {
            tracing::debug!(node = %node, error = %e, "Failed to set TCP_NODELAY");
        }

        if node.protocol() == NodeProtocol::Plain {
            return Ok(Stream::from(tcp));
        }

        let connector = self
            .tls
            .as_ref()
            .ok_or_else(|| ConnectError::NoTrustRoots(node.route().to_string()))?;
        let server_name = ServerName::try_from(node.host().to_string())
            .map_err(|_| ConnectError::ServerName(node.host().to_string()))?;
        let handshake = connector.connect(server_name, tcp);
        match tokio::time::timeout(self.connect_timeout, handshake).await {
            Ok(Ok(tls)) => Ok(Stream::from(TlsStream::from(tls))),
            Ok(Err(source)) => Err(ConnectError::Handshake { address, source }),
            Err(_) => Err(ConnectError::Timeout { address }),
        }
    }

    /// Return a connection to its node's idle queue if it is still open.
    ///
    /// Connections for a node that was removed in the meantime are dropped.
    pub fn recycle(&self, node: &Node, conn: PooledConnection) {
        if conn.node_id != node.id() {
            tracing::warn!(node = %node, owner = conn.node_id, "Connection recycled to wrong node, closing");
            return;
        }
        if conn.address != node.address() || conn.protocol != node.protocol() {
            tracing::debug!(node = %node, opened_to = %conn.address, "Node moved since connect, closing connection");
            return;
        }
        if !conn.is_open() {
            tracing::debug!(node = %node, "Backend closed connection, not pooling");
            return;
        }
        match self.idle.get(&conn.node_id) {
            Some(queue) => queue.push(conn),
            None => tracing::debug!(node = %node, "Node pool gone, closing connection"),
        }
    }

    /// Close every idle connection of a node and forget its pool.
    pub fn remove_node(&self, node_id: u64) -> usize {
        match self.idle.remove(&node_id) {
            Some((_, queue)) => {
                let mut closed = 0;
                while queue.pop().is_some() {
                    closed += 1;
                }
                closed
            }
            None => 0,
        }
    }

    /// Close every idle connection. Used at shutdown.
    pub fn drain_all(&self) -> usize {
        let ids: Vec<u64> = self.idle.iter().map(|e| *e.key()).collect();
        let closed: usize = ids.into_iter().map(|id| self.remove_node(id)).sum();
        tracing::info!(closed, "Backend connection pools drained");
        closed
    }

    pub fn idle_count(&self, node_id: u64) -> usize {
        self.idle.get(&node_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn total_idle(&self) -> usize {
        self.idle.iter().map(|q| q.len()).sum()
    }
}
