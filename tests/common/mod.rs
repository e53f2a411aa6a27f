//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use cluster_proxy::config::{BalancerConfig, ListenerConfig, NodeConfig, ProxyConfig};
use cluster_proxy::lifecycle::{build_context, Shutdown};
use cluster_proxy::proxy::{Endpoint, EndpointControl, ProxyContext};

/// A backend that answers every request on a connection with the same
/// response, written in the given fragment sizes with a pause in between.
#[allow(dead_code)]
pub struct MockBackend {
    pub addr: SocketAddr,
    /// TCP connections accepted so far.
    pub accepted: Arc<AtomicUsize>,
    /// Request heads taken on so far, counted before the response is written.
    pub served: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

/// Start a scripted backend on an ephemeral port.
pub async fn start_scripted_backend(response: &'static [u8], fragments: &'static [usize]) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let served = Arc::new(AtomicUsize::new(0));

    let accepted_count = accepted.clone();
    let served_count = served.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            accepted_count.fetch_add(1, Ordering::SeqCst);
            let served = served_count.clone();
            tokio::spawn(serve_scripted(socket, response, fragments, served));
        }
    });

    MockBackend { addr, accepted, served }
}

async fn serve_scripted(
    mut socket: TcpStream,
    response: &'static [u8],
    fragments: &'static [usize],
    served: Arc<AtomicUsize>,
) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        // One response per request head; request bodies are not used here.
        while let Some(end) = find_head_end(&pending) {
            pending.drain(..end);
            served.fetch_add(1, Ordering::SeqCst);
            if write_fragmented(&mut socket, response, fragments).await.is_err() {
                return;
            }
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => pending.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn write_fragmented(socket: &mut TcpStream, response: &[u8], fragments: &[usize]) -> std::io::Result<()> {
    let mut offset = 0;
    for &size in fragments {
        let end = (offset + size).min(response.len());
        socket.write_all(&response[offset..end]).await?;
        socket.flush().await?;
        offset = end;
        if offset == response.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    if offset < response.len() {
        socket.write_all(&response[offset..]).await?;
    }
    socket.flush().await
}

fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// A backend that answers with `response` and then honours the request's
/// persistence: it closes after `Connection: close`, or after an HTTP/1.0
/// request that did not ask for keep-alive.
#[allow(dead_code)]
pub async fn start_closing_backend(response: &'static [u8]) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let served = Arc::new(AtomicUsize::new(0));

    let accepted_count = accepted.clone();
    let served_count = served.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            accepted_count.fetch_add(1, Ordering::SeqCst);
            let served = served_count.clone();
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    if let Some(end) = find_head_end(&pending) {
                        let head: Vec<u8> = pending.drain(..end).collect();
                        served.fetch_add(1, Ordering::SeqCst);
                        if socket.write_all(response).await.is_err() || !persists(&head) {
                            let _ = socket.shutdown().await;
                            return;
                        }
                        continue;
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => pending.extend_from_slice(&chunk[..n]),
                    }
                }
            });
        }
    });

    MockBackend { addr, accepted, served }
}

fn persists(head: &[u8]) -> bool {
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let connection = head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == "connection").then(|| value.trim().to_string())
    });
    let http10 = head.lines().next().is_some_and(|line| line.trim_end().ends_with("http/1.0"));
    match connection.as_deref() {
        Some(value) if value.contains("close") => false,
        Some(value) if value.contains("keep-alive") => true,
        _ => !http10,
    }
}

/// A backend that echoes the raw request head back as the response body.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    if let Some(end) = find_head_end(&pending) {
                        let head: Vec<u8> = pending.drain(..end).collect();
                        let mut response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
                            head.len()
                        )
                        .into_bytes();
                        response.extend_from_slice(&head);
                        if socket.write_all(&response).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => pending.extend_from_slice(&chunk[..n]),
                    }
                }
            });
        }
    });
    addr
}

/// A running proxy bound to an ephemeral port.
#[allow(dead_code)]
pub struct TestProxy {
    pub addr: SocketAddr,
    pub ctx: Arc<ProxyContext>,
    pub control: EndpointControl,
    pub shutdown: Shutdown,
}

/// Boot an endpoint in front of `nodes`, health checking disabled.
pub async fn start_proxy(balancers: Vec<BalancerConfig>, nodes: Vec<NodeConfig>) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.listener = ListenerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ListenerConfig::default()
    };
    config.health_check.enabled = false;
    config.timeouts.read_secs = 5;
    config.timeouts.write_secs = 5;
    config.timeouts.keep_alive_secs = 5;
    config.timeouts.drain_secs = 2;
    config.balancers = balancers;
    config.nodes = nodes;

    let ctx = build_context(&config).unwrap();
    let endpoint = Endpoint::bind(&config.listener, ctx.clone()).await.unwrap();
    let addr = endpoint.local_addr().unwrap();
    let control = endpoint.control();
    let shutdown = Shutdown::new();
    let rx: broadcast::Receiver<()> = shutdown.subscribe();
    tokio::spawn(endpoint.run(rx));

    TestProxy { addr, ctx, control, shutdown }
}

/// Read one response with a Content-Length body off `stream`.
#[allow(dead_code)]
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut bytes = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find_head_end(&bytes) {
            let head = String::from_utf8_lossy(&bytes[..end]).to_string();
            let length = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if bytes.len() >= end + length {
                return String::from_utf8_lossy(&bytes[..end + length]).to_string();
            }
        }
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("response timed out")
            .unwrap();
        assert!(n > 0, "connection closed mid-response");
        bytes.extend_from_slice(&chunk[..n]);
    }
}

/// Read until the peer closes.
#[allow(dead_code)]
pub async fn read_to_close(stream: &mut TcpStream) -> String {
    let mut bytes = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut bytes))
        .await
        .expect("peer did not close")
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}
