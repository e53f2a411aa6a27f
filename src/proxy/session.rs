//! Client connection loop: read a request head, run an exchange, repeat
//! while both sides keep the connection alive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::buffer::Buffer;
use crate::http::{ParseError, RequestHead};
use crate::proxy::endpoint::EndpointState;
use crate::proxy::error::{ExchangeError, Side, TransportError};
use crate::proxy::exchange::{read_some, Exchange};
use crate::proxy::ProxyContext;

/// Serve requests on one client connection until it closes, idles out,
/// or the endpoint stops.
pub async fn serve_connection<C>(
    ctx: Arc<ProxyContext>,
    mut client: C,
    peer: SocketAddr,
    mut control: watch::Receiver<EndpointState>,
) where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let mut client_buf = ctx.buffers.lease();
    let mut exchange = Exchange::new(Arc::clone(&ctx));
    let mut served = 0u64;

    loop {
        let wait = if served == 0 {
            ctx.timeouts.read()
        } else {
            ctx.timeouts.keep_alive()
        };
        let request = match read_request(&mut client, &mut client_buf, wait, &mut control).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "Dropping client connection");
                break;
            }
        };

        match exchange.run(&mut client, &mut client_buf, &request, peer).await {
            Ok(outcome) => {
                served += 1;
                if !outcome.client_keep_alive {
                    break;
                }
            }
            Err(_) => break,
        }
        exchange.reset();
    }

    let _ = client.shutdown().await;
    tracing::trace!(peer = %peer, served, "Client connection finished");
}

/// Buffer bytes until a full request head is available.
///
/// `Ok(None)` means the connection ended cleanly between requests: EOF,
/// idle timeout, or the endpoint stopping.
pub(crate) async fn read_request<C>(
    client: &mut C,
    buf: &mut Buffer,
    wait: Duration,
    control: &mut watch::Receiver<EndpointState>,
) -> Result<Option<RequestHead>, ExchangeError>
where
    C: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            buf.shift();
            if let Some(head) = RequestHead::parse(buf.data())? {
                return Ok(Some(head));
            }
            if buf.is_full() {
                return Err(ParseError::HeadersTooLarge { limit: buf.capacity() }.into());
            }
        }

        if buf.is_empty() && *control.borrow() == EndpointState::Stopped {
            return Ok(None);
        }

        let read = tokio::select! {
            read = read_some(client, buf, wait, Side::Client) => read,
            changed = control.changed(), if buf.is_empty() => {
                if changed.is_err() {
                    return Ok(None);
                }
                continue;
            }
        };

        match read {
            Ok(0) if buf.is_empty() => return Ok(None),
            Ok(0) => return Err(TransportError::UnexpectedEof { side: Side::Client }.into()),
            Ok(_) => {}
            Err(TransportError::Timeout { .. }) if buf.is_empty() => {
                tracing::trace!("Keep-alive timeout");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> (watch::Sender<EndpointState>, watch::Receiver<EndpointState>) {
        watch::channel(EndpointState::Running)
    }

    #[tokio::test]
    async fn reads_head_across_fragments() {
        let (client_side, mut proxy_side) = tokio::io::duplex(64);
        let (_tx, mut rx) = control();
        let writer = tokio::spawn(async move {
            let mut client_side = client_side;
            client_side.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            client_side.write_all(b"Host: a\r\n\r\nGET /next").await.unwrap();
            client_side
        });

        let mut buf = Buffer::with_capacity(256);
        let head = read_request(&mut proxy_side, &mut buf, Duration::from_secs(1), &mut rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.path, "/");
        assert_eq!(head.header("host"), Some("a"));
        let _client_side = writer.await.unwrap();
    }

    #[tokio::test]
    async fn clean_eof_between_requests() {
        let (client_side, mut proxy_side) = tokio::io::duplex(64);
        drop(client_side);
        let (_tx, mut rx) = control();
        let mut buf = Buffer::with_capacity(256);
        let result = read_request(&mut proxy_side, &mut buf, Duration::from_secs(1), &mut rx)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn eof_inside_head_is_an_error() {
        let (mut client_side, mut proxy_side) = tokio::io::duplex(64);
        client_side.write_all(b"GET / HTT").await.unwrap();
        drop(client_side);
        let (_tx, mut rx) = control();
        let mut buf = Buffer::with_capacity(256);
        assert!(read_request(&mut proxy_side, &mut buf, Duration::from_secs(1), &mut rx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn idle_timeout_closes_quietly() {
        let (_client_side, mut proxy_side) = tokio::io::duplex(64);
        let (_tx, mut rx) = control();
        let mut buf = Buffer::with_capacity(256);
        let result = read_request(&mut proxy_side, &mut buf, Duration::from_millis(20), &mut rx)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn stop_wakes_idle_connection() {
        let (_client_side, mut proxy_side) = tokio::io::duplex(64);
        let (tx, mut rx) = control();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send_replace(EndpointState::Stopped);
            // keep the sender alive until the reader observed the change
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        let mut buf = Buffer::with_capacity(256);
        let result = read_request(&mut proxy_side, &mut buf, Duration::from_secs(10), &mut rx)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let (mut client_side, mut proxy_side) = tokio::io::duplex(256);
        client_side.write_all(&[b'a'; 64]).await.unwrap();
        let (_tx, mut rx) = control();
        let mut buf = Buffer::with_capacity(32);
        let err = read_request(&mut proxy_side, &mut buf, Duration::from_secs(1), &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Parse(_)));
    }
}
