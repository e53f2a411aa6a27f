//! Bounded TCP acceptor.
//!
//! At most `max_connections` client sockets are open at once. Once the
//! limit is reached `accept` parks until a [`ConnectionPermit`] is dropped,
//! leaving further clients in the kernel backlog.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("accept: {0}")]
    Accept(#[source] std::io::Error),
    /// The connection limit semaphore was closed.
    #[error("listener closed")]
    Closed,
}

pub struct Listener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
    nodelay: bool,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            address: config.bind_address.clone(),
            source,
        };
        let inner = TcpListener::bind(config.bind_address.as_str())
            .await
            .map_err(bind_error)?;
        let local = inner.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local,
            max_connections = config.max_connections,
            nodelay = config.nodelay,
            "Listener bound"
        );

        Ok(Self {
            inner,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            nodelay: config.nodelay,
        })
    }

    /// Wait for a free slot, then for a client.
    ///
    /// The permit must live as long as the client socket.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (socket, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if self.nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %e, "TCP_NODELAY not applied");
            }
        }

        tracing::trace!(peer = %peer, free_slots = self.slots.available_permits(), "Client accepted");
        Ok((socket, peer, ConnectionPermit { _slot: slot }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// One occupied connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn permits_track_open_connections() {
        let listener = Listener::bind(&config(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (socket, _peer, permit) = listener.accept().await.unwrap();
        assert!(socket.nodelay().unwrap());
        assert_eq!(listener.available_permits(), 1);
        assert_eq!(listener.max_connections(), 2);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn full_listener_parks_accept() {
        let listener = Listener::bind(&config(1)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        let (_socket, _peer, permit) = listener.accept().await.unwrap();
        let _second = TcpStream::connect(addr).await.unwrap();

        let parked = tokio::time::timeout(std::time::Duration::from_millis(50), listener.accept()).await;
        assert!(parked.is_err());

        drop(permit);
        assert!(listener.accept().await.is_ok());
    }

    #[tokio::test]
    async fn invalid_address_fails_bind() {
        let bad = ListenerConfig {
            bind_address: "not-an-address".into(),
            ..ListenerConfig::default()
        };
        assert!(matches!(Listener::bind(&bad).await, Err(ListenerError::Bind { .. })));
    }
}
