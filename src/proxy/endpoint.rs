//! Client-facing acceptor.
//!
//! # Responsibilities
//! - Accept connections under the listener's connection limit
//! - Hand every connection to a worker task (TLS handshake included)
//! - Pause/resume accepting, stop with a bounded drain of open connections

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_rustls::{TlsAcceptor, TlsStream};
use tracing::Instrument;

use crate::config::ListenerConfig;
use crate::net::{tls, ConnectionPermit, ConnectionTracker, Listener, ListenerError, Stream, TlsError};
use crate::proxy::session::serve_connection;
use crate::proxy::ProxyContext;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("listener TLS: {0}")]
    Tls(#[from] TlsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Running,
    Paused,
    Stopped,
}

/// Handle for pausing, resuming and stopping a running endpoint.
#[derive(Debug, Clone)]
pub struct EndpointControl {
    tx: Arc<watch::Sender<EndpointState>>,
}

impl EndpointControl {
    /// A control not attached to any endpoint, with a receiver observing it.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, watch::Receiver<EndpointState>) {
        let (tx, rx) = watch::channel(EndpointState::Running);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Stop accepting; open connections keep being served.
    pub fn pause(&self) -> bool {
        self.transition(EndpointState::Running, EndpointState::Paused)
    }

    pub fn resume(&self) -> bool {
        self.transition(EndpointState::Paused, EndpointState::Running)
    }

    /// Stop accepting, drain open connections, close backend pools.
    pub fn stop(&self) {
        self.tx.send_replace(EndpointState::Stopped);
    }

    pub fn state(&self) -> EndpointState {
        *self.tx.borrow()
    }

    fn transition(&self, from: EndpointState, to: EndpointState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

pub struct Endpoint {
    listener: Listener,
    tls: Option<TlsAcceptor>,
    ctx: Arc<ProxyContext>,
    tracker: ConnectionTracker,
    control: Arc<watch::Sender<EndpointState>>,
}

impl Endpoint {
    pub async fn bind(config: &ListenerConfig, ctx: Arc<ProxyContext>) -> Result<Self, EndpointError> {
        let tls = config.tls.as_ref().map(tls::load_acceptor).transpose()?;
        let listener = Listener::bind(config).await?;
        let (tx, _) = watch::channel(EndpointState::Running);
        Ok(Self {
            listener,
            tls,
            ctx,
            tracker: ConnectionTracker::new(),
            control: Arc::new(tx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn control(&self) -> EndpointControl {
        EndpointControl {
            tx: Arc::clone(&self.control),
        }
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept until stopped or the shutdown signal fires, then drain.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut state = self.control.subscribe();
        tracing::info!(tls = self.tls.is_some(), "Endpoint accepting connections");

        loop {
            let current = *state.borrow_and_update();
            match current {
                EndpointState::Stopped => break,
                EndpointState::Paused => {
                    tracing::info!("Endpoint paused");
                    tokio::select! {
                        _ = state.changed() => continue,
                        _ = shutdown.recv() => break,
                    }
                }
                EndpointState::Running => {}
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((tcp, peer, permit)) => self.dispatch(tcp, peer, permit),
                    Err(ListenerError::Closed) => break,
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                _ = state.changed() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Endpoint received shutdown signal");
                    break;
                }
            }
        }

        self.drain().await;
    }

    fn dispatch(&self, tcp: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let ctx = Arc::clone(&self.ctx);
        let tls = self.tls.clone();
        let guard = self.tracker.track();
        let control = self.control.subscribe();
        let span = tracing::debug_span!("connection", connection_id = %guard.id(), peer = %peer);

        let task = async move {
            let _permit = permit;
            let _guard = guard;

            let stream = match tls {
                None => Stream::from(tcp),
                Some(acceptor) => {
                    match tokio::time::timeout(ctx.timeouts.read(), acceptor.accept(tcp)).await {
                        Ok(Ok(tls)) => Stream::from(TlsStream::from(tls)),
                        Ok(Err(e)) => {
                            tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!(peer = %peer, "TLS handshake timed out");
                            return;
                        }
                    }
                }
            };

            serve_connection(ctx, stream, peer, control).await;
        };
        tokio::spawn(task.instrument(span));
    }

    async fn drain(&self) {
        self.control.send_replace(EndpointState::Stopped);
        let drain = self.ctx.timeouts.drain();
        tracing::info!(
            active = self.tracker.active_count(),
            timeout_secs = drain.as_secs(),
            "Endpoint stopped, draining connections"
        );
        if !self.tracker.wait_idle(drain).await {
            tracing::warn!(remaining = self.tracker.active_count(), "Drain timed out");
        }
        self.ctx.connections.drain_all();
    }
}
