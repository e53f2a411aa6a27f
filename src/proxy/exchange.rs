//! One client request forwarded to one node.
//!
//! # States
//! ```text
//! AwaitClientRequest → NodeSelected → ConnectedUpstream → ForwardingRequest
//!     → AwaitingResponse → StreamingResponse → Done
//! (any) → Failed
//! ```
//!
//! The response head is accumulated in the backend buffer until the parser
//! reports it complete, then head and body bytes are relayed to the client
//! unchanged as they arrive. Chunked bodies are watched by `ChunkedTracker`
//! only to find their end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffer::{Buffer, LeasedBuffer};
use crate::cluster::Node;
use crate::config::TimeoutConfig;
use crate::http::{ChunkedTracker, ParseError, RequestBody, RequestHead, ResponseStreamParser, X_REQUEST_ID};
use crate::observability::metrics;
use crate::proxy::error::{ExchangeError, Side, TransportError};
use crate::proxy::pool::PooledConnection;
use crate::proxy::ProxyContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    AwaitClientRequest,
    NodeSelected,
    ConnectedUpstream,
    ForwardingRequest,
    AwaitingResponse,
    StreamingResponse,
    Done,
    Failed,
}

/// How the response body is delimited on the wire, and therefore how the
/// client-facing output is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body: HEAD request, 204, 304.
    Empty,
    ContentLength(u64),
    Chunked,
    /// Body runs until the backend closes. Also used for 101 responses,
    /// which are relayed one way and never reused.
    UntilClose,
}

impl Framing {
    fn is_delimited(self) -> bool {
        matches!(self, Framing::Empty | Framing::ContentLength(_) | Framing::Chunked)
    }
}

/// What the session needs to know once an exchange completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub route: String,
    pub status: u16,
    pub framing: Framing,
    /// Body bytes relayed to the client.
    pub body_bytes: u64,
    pub header_length: usize,
    /// Serve the next request on this client connection.
    pub client_keep_alive: bool,
    /// The backend connection went back to its pool.
    pub backend_recycled: bool,
}

/// Result of relaying one backend response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Relayed {
    pub framing: Framing,
    pub body_bytes: u64,
    pub total_bytes: u64,
    /// Backend sent bytes past the end of the message.
    pub excess: bool,
}

/// Read timeout, write timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IoTimeouts {
    pub read: Duration,
    pub write: Duration,
}

impl IoTimeouts {
    /// Proxy defaults, overridden by a node's own non-zero `timeout_secs`.
    pub(crate) fn for_node(defaults: &TimeoutConfig, node: &Node) -> Self {
        match node.config().timeout_secs {
            0 => Self {
                read: defaults.read(),
                write: defaults.write(),
            },
            secs => Self {
                read: Duration::from_secs(secs),
                write: Duration::from_secs(secs),
            },
        }
    }
}

pub struct Exchange {
    ctx: Arc<ProxyContext>,
    state: ExchangeState,
    node: Option<Arc<Node>>,
    backend: Option<PooledConnection>,
    backend_buf: LeasedBuffer,
    parser: ResponseStreamParser,
    body_forwarded: u64,
}

impl Exchange {
    pub fn new(ctx: Arc<ProxyContext>) -> Self {
        let backend_buf = ctx.buffers.lease();
        let parser = ResponseStreamParser::new(ctx.buffers.buffer_size());
        Self {
            ctx,
            state: ExchangeState::AwaitClientRequest,
            node: None,
            backend: None,
            backend_buf,
            parser,
            body_forwarded: 0,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn node(&self) -> Option<&Arc<Node>> {
        self.node.as_ref()
    }

    /// Prepare for the next request on the same client connection.
    pub fn reset(&mut self) {
        self.state = ExchangeState::AwaitClientRequest;
        self.node = None;
        self.backend = None;
        self.backend_buf.clear();
        self.parser.recycle();
        self.body_forwarded = 0;
    }

    /// Forward `request` (head at the front of `client_buf`) and relay the
    /// response. On return `client_buf` holds only bytes of later requests.
    pub async fn run<C>(
        &mut self,
        client: &mut C,
        client_buf: &mut Buffer,
        request: &RequestHead,
        peer: SocketAddr,
    ) -> Result<ExchangeOutcome, ExchangeError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        match self.drive(client, client_buf, request, peer).await {
            Ok(outcome) => {
                self.state = ExchangeState::Done;
                metrics::record_exchange("ok");
                Ok(outcome)
            }
            Err(e) => {
                self.state = ExchangeState::Failed;
                // Dropping the connection closes it; it never returns to a pool.
                self.backend = None;
                metrics::record_exchange(e.outcome());
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    node = ?self.node.as_ref().map(|n| n.route().to_string()),
                    error = %e,
                    "Exchange failed"
                );
                Err(e)
            }
        }
    }

    async fn drive<C>(
        &mut self,
        client: &mut C,
        client_buf: &mut Buffer,
        request: &RequestHead,
        peer: SocketAddr,
    ) -> Result<ExchangeOutcome, ExchangeError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = ExchangeState::NodeSelected;
        let node = self.ctx.registry.resolve(request)?;
        self.node = Some(Arc::clone(&node));
        let timeouts = IoTimeouts::for_node(&self.ctx.timeouts, &node);

        self.state = ExchangeState::ConnectedUpstream;
        let conn = match self.ctx.connections.get_channel(&node).await {
            Ok(conn) => conn,
            Err(e) => {
                self.ctx.registry.mark_down(&node);
                return Err(e.into());
            }
        };
        let backend = self.backend.insert(conn);

        self.state = ExchangeState::ForwardingRequest;
        let generated_id;
        let request_id = match request.header(X_REQUEST_ID) {
            Some(id) => id,
            None => {
                generated_id = uuid::Uuid::new_v4().to_string();
                generated_id.as_str()
            }
        };
        let peer_ip = peer.ip().to_string();
        let node_address = node.address();
        let mut extra = vec![("X-Forwarded-For", peer_ip.as_str())];
        if request.header(X_REQUEST_ID).is_none() {
            extra.push(("X-Request-Id", request_id));
        }
        // HTTP/1.0 clients may omit Host; the upstream request is HTTP/1.1.
        if request.header("host").is_none() {
            extra.push(("Host", node_address.as_str()));
        }
        let head = request.upstream_head(client_buf.data(), &extra);
        client_buf.consume(request.head_len);

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            node = %node,
            reused = backend.is_reused(),
            "Forwarding request"
        );

        write_all(backend.stream(), &head, timeouts.write, Side::Backend).await?;
        forward_request_body(client, client_buf, backend.stream(), request.body, timeouts).await?;
        flush(backend.stream(), timeouts.write, Side::Backend).await?;

        self.state = ExchangeState::AwaitingResponse;
        self.backend_buf.clear();
        self.parser.recycle();
        let relayed = stream_response(
            backend.stream(),
            client,
            &mut self.backend_buf,
            &mut self.parser,
            request.is_head(),
            timeouts,
            &mut self.state,
        )
        .await?;
        self.body_forwarded = relayed.body_bytes;
        metrics::record_bytes_forwarded(relayed.total_bytes);

        let reusable = relayed.framing.is_delimited() && self.parser.keep_alive() && !relayed.excess;
        let backend_recycled = match self.backend.take() {
            Some(conn) if reusable => {
                self.ctx.connections.recycle(&node, conn);
                true
            }
            _ => false,
        };

        let client_keep_alive = request.keep_alive
            && relayed.framing.is_delimited()
            && !self.parser.connection_close();

        tracing::debug!(
            request_id = %request_id,
            status = self.parser.status(),
            framing = ?relayed.framing,
            body_bytes = relayed.body_bytes,
            client_keep_alive,
            backend_recycled,
            "Exchange complete"
        );

        Ok(ExchangeOutcome {
            route: node.route().to_string(),
            status: self.parser.status(),
            framing: relayed.framing,
            body_bytes: self.body_forwarded,
            header_length: self.parser.header_length(),
            client_keep_alive,
            backend_recycled,
        })
    }
}

// --- I/O helpers ---

/// Read into the free tail of `buf`. Returns 0 at EOF.
pub(crate) async fn read_some<R>(
    reader: &mut R,
    buf: &mut Buffer,
    timeout: Duration,
    side: Side,
) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin,
{
    let n = match tokio::time::timeout(timeout, reader.read(buf.space())).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(TransportError::io(side, e)),
        Err(_) => return Err(TransportError::Timeout { side }),
    };
    buf.fill(n);
    Ok(n)
}

/// Write everything, retrying partial writes until drained.
pub(crate) async fn write_all<W>(
    writer: &mut W,
    bytes: &[u8],
    timeout: Duration,
    side: Side,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, writer.write_all(bytes)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::io(side, e)),
        Err(_) => Err(TransportError::Timeout { side }),
    }
}

pub(crate) async fn flush<W>(writer: &mut W, timeout: Duration, side: Side) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, writer.flush()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::io(side, e)),
        Err(_) => Err(TransportError::Timeout { side }),
    }
}

/// Copy the request body from the client to the backend.
///
/// Bytes already buffered after the head are sent first. Anything past the
/// end of the body stays in `client_buf`.
pub(crate) async fn forward_request_body<C, B>(
    client: &mut C,
    client_buf: &mut Buffer,
    backend: &mut B,
    body: RequestBody,
    timeouts: IoTimeouts,
) -> Result<u64, ExchangeError>
where
    C: AsyncRead + Unpin,
    B: AsyncWrite + Unpin,
{
    let mut tracker = match body {
        RequestBody::None => return Ok(0),
        RequestBody::Length(len) => BodyTracker::Remaining(len),
        RequestBody::Chunked => BodyTracker::Chunked(ChunkedTracker::new()),
    };

    let mut sent = 0u64;
    loop {
        if client_buf.is_empty() && read_some(client, client_buf, timeouts.read, Side::Client).await? == 0 {
            return Err(TransportError::UnexpectedEof { side: Side::Client }.into());
        }
        let end = tracker.advance(client_buf.data())?;
        let take = end.unwrap_or(client_buf.len());
        write_all(backend, &client_buf.data()[..take], timeouts.write, Side::Backend).await?;
        client_buf.consume(take);
        sent += take as u64;
        if end.is_some() {
            return Ok(sent);
        }
    }
}

/// Relay one backend response to the client.
///
/// `buf` must be empty and `parser` recycled. Interim 1xx responses are
/// relayed and parsing restarts on the bytes that follow them.
pub(crate) async fn stream_response<B, C>(
    backend: &mut B,
    client: &mut C,
    buf: &mut Buffer,
    parser: &mut ResponseStreamParser,
    head_request: bool,
    timeouts: IoTimeouts,
    state: &mut ExchangeState,
) -> Result<Relayed, ExchangeError>
where
    B: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    let mut total_bytes = 0u64;
    let mut fed = 0;

    let head_end = loop {
        if fed == buf.len() {
            if buf.is_full() {
                return Err(ParseError::HeadersTooLarge { limit: buf.capacity() }.into());
            }
            if read_some(backend, buf, timeouts.read, Side::Backend).await? == 0 {
                return Err(TransportError::UnexpectedEof { side: Side::Backend }.into());
            }
        }
        let start = fed;
        fed = buf.len();
        let Some(offset) = parser.feed(&buf.data()[start..])? else {
            continue;
        };
        let head_end = start + offset;
        let status = parser.status();
        if (100..200).contains(&status) && status != 101 {
            write_all(client, &buf.data()[..head_end], timeouts.write, Side::Client).await?;
            total_bytes += head_end as u64;
            buf.consume(head_end);
            fed = 0;
            parser.recycle();
            continue;
        }
        break head_end;
    };

    *state = ExchangeState::StreamingResponse;
    let status = parser.status();
    let framing = if status == 101 {
        Framing::UntilClose
    } else if head_request || status == 204 || status == 304 {
        Framing::Empty
    } else if parser.is_chunked() {
        Framing::Chunked
    } else if let Some(len) = parser.content_length() {
        Framing::ContentLength(len)
    } else {
        Framing::UntilClose
    };

    let mut tracker = BodyTracker::for_framing(framing);
    let mut body_bytes = 0u64;

    // Head plus whatever body arrived with it.
    let end = tracker.advance(&buf.data()[head_end..])?;
    let take = end.map(|n| head_end + n).unwrap_or(buf.len());
    write_all(client, &buf.data()[..take], timeouts.write, Side::Client).await?;
    total_bytes += take as u64;
    body_bytes += (take - head_end) as u64;
    buf.consume(take);

    let mut finished = end.is_some();
    while !finished {
        if read_some(backend, buf, timeouts.read, Side::Backend).await? == 0 {
            if framing == Framing::UntilClose {
                break;
            }
            return Err(TransportError::UnexpectedEof { side: Side::Backend }.into());
        }
        let end = tracker.advance(buf.data())?;
        let take = end.unwrap_or(buf.len());
        write_all(client, &buf.data()[..take], timeouts.write, Side::Client).await?;
        total_bytes += take as u64;
        body_bytes += take as u64;
        buf.consume(take);
        finished = end.is_some();
    }
    flush(client, timeouts.write, Side::Client).await?;

    Ok(Relayed {
        framing,
        body_bytes,
        total_bytes,
        excess: !buf.is_empty(),
    })
}

/// Finds where a message body ends.
#[derive(Debug)]
enum BodyTracker {
    Remaining(u64),
    Chunked(ChunkedTracker),
    /// Ends only with the connection.
    Unbounded,
    /// Already complete.
    Empty,
}

impl BodyTracker {
    fn for_framing(framing: Framing) -> Self {
        match framing {
            Framing::Empty => BodyTracker::Empty,
            Framing::ContentLength(len) => BodyTracker::Remaining(len),
            Framing::Chunked => BodyTracker::Chunked(ChunkedTracker::new()),
            Framing::UntilClose => BodyTracker::Unbounded,
        }
    }

    /// Returns `Some(n)` when the body ends after `n` bytes of `bytes`.
    fn advance(&mut self, bytes: &[u8]) -> Result<Option<usize>, ParseError> {
        match self {
            BodyTracker::Empty => Ok(Some(0)),
            BodyTracker::Remaining(remaining) => {
                let available = bytes.len() as u64;
                if available >= *remaining {
                    let n = *remaining as usize;
                    *remaining = 0;
                    Ok(Some(n))
                } else {
                    *remaining -= available;
                    Ok(None)
                }
            }
            BodyTracker::Chunked(tracker) => tracker.observe(bytes),
            BodyTracker::Unbounded => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Reader that yields each fragment from a separate `read` call.
    struct Fragmented {
        fragments: VecDeque<Vec<u8>>,
    }

    impl Fragmented {
        fn new(bytes: &[u8], sizes: &[usize]) -> Self {
            let mut fragments = VecDeque::new();
            let mut at = 0;
            for size in sizes {
                fragments.push_back(bytes[at..at + size].to_vec());
                at += size;
            }
            if at < bytes.len() {
                fragments.push_back(bytes[at..].to_vec());
            }
            Self { fragments }
        }
    }

    impl AsyncRead for Fragmented {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(mut fragment) = self.fragments.pop_front() {
                let n = fragment.len().min(buf.remaining());
                buf.put_slice(&fragment[..n]);
                if n < fragment.len() {
                    self.fragments.push_front(fragment.split_off(n));
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    fn timeouts() -> IoTimeouts {
        IoTimeouts {
            read: Duration::from_secs(1),
            write: Duration::from_secs(1),
        }
    }

    async fn relay(
        response: &[u8],
        sizes: &[usize],
        head_request: bool,
    ) -> (Relayed, ResponseStreamParser, Vec<u8>) {
        let mut backend = Fragmented::new(response, sizes);
        let mut client = Vec::new();
        let mut buf = Buffer::with_capacity(1024);
        let mut parser = ResponseStreamParser::new(1024);
        let mut state = ExchangeState::AwaitingResponse;
        let relayed = stream_response(
            &mut backend,
            &mut client,
            &mut buf,
            &mut parser,
            head_request,
            timeouts(),
            &mut state,
        )
        .await
        .unwrap();
        assert_eq!(state, ExchangeState::StreamingResponse);
        (relayed, parser, client)
    }

    const HELLO: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

    #[tokio::test]
    async fn fragmented_content_length_response() {
        let (relayed, parser, client) = relay(HELLO, &[7, 20, 16], false).await;

        assert_eq!(parser.status(), 200);
        assert_eq!(parser.head().message, "OK");
        assert_eq!(parser.head().header("content-length"), Some("5"));
        assert_eq!(parser.header_length(), HELLO.len() - 5);
        assert_eq!(client, HELLO);
        assert!(client.ends_with(b"hello"));
        assert_eq!(relayed.framing, Framing::ContentLength(5));
        assert_eq!(relayed.body_bytes, 5);
        assert!(!relayed.excess);
        assert!(parser.keep_alive());
    }

    #[tokio::test]
    async fn every_split_relays_identical_bytes() {
        for cut in 1..HELLO.len() {
            let (relayed, parser, client) = relay(HELLO, &[cut], false).await;
            assert_eq!(client, HELLO, "cut {}", cut);
            assert_eq!(relayed.body_bytes, 5);
            assert_eq!(parser.status(), 200);
        }
    }

    #[tokio::test]
    async fn chunked_body_passes_through() {
        let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let (relayed, parser, client) = relay(response, &[30, 9, 11], false).await;

        assert!(parser.is_chunked());
        assert_eq!(relayed.framing, Framing::Chunked);
        assert_eq!(client, response.to_vec());
        assert!(!relayed.excess);
    }

    #[tokio::test]
    async fn bytes_after_body_are_excess() {
        let mut response = HELLO.to_vec();
        response.extend_from_slice(b"HTTP/1.1 200");
        let (relayed, _, client) = relay(&response, &[], false).await;
        assert_eq!(client, HELLO);
        assert!(relayed.excess);
    }

    #[tokio::test]
    async fn head_request_has_no_body() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n";
        let (relayed, _, client) = relay(response, &[], true).await;
        assert_eq!(relayed.framing, Framing::Empty);
        assert_eq!(relayed.body_bytes, 0);
        assert_eq!(client, response.to_vec());
    }

    #[tokio::test]
    async fn interim_response_is_relayed() {
        let response = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n";
        let (relayed, parser, client) = relay(response, &[10], false).await;
        assert_eq!(parser.status(), 204);
        assert_eq!(relayed.framing, Framing::Empty);
        assert_eq!(client, response.to_vec());
    }

    #[tokio::test]
    async fn close_delimited_body_ends_at_eof() {
        let response = b"HTTP/1.0 200 OK\r\n\r\nuntil close";
        let (relayed, parser, client) = relay(response, &[5], false).await;
        assert_eq!(relayed.framing, Framing::UntilClose);
        assert_eq!(relayed.body_bytes, 11);
        assert!(!parser.keep_alive());
        assert_eq!(client, response.to_vec());
    }

    #[test]
    fn node_timeout_overrides_defaults() {
        let defaults = TimeoutConfig::default();
        let node = Node::new(1, crate::config::NodeConfig::new("a", "127.0.0.1", 8080));
        let timeouts = IoTimeouts::for_node(&defaults, &node);
        assert_eq!(timeouts.read, defaults.read());
        assert_eq!(timeouts.write, defaults.write());

        let mut config = crate::config::NodeConfig::new("b", "127.0.0.1", 8081);
        config.timeout_secs = 3;
        let node = Node::new(2, config);
        let timeouts = IoTimeouts::for_node(&defaults, &node);
        assert_eq!(timeouts.read, Duration::from_secs(3));
        assert_eq!(timeouts.write, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn switching_protocols_is_relayed_until_close() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: foo\r\n\r\nraw bytes";
        let (relayed, parser, client) = relay(response, &[12], false).await;
        assert_eq!(parser.status(), 101);
        assert_eq!(relayed.framing, Framing::UntilClose);
        assert_eq!(relayed.body_bytes, 9);
        assert_eq!(client, response.to_vec());
    }

    #[tokio::test]
    async fn truncated_body_is_a_backend_failure() {
        let mut backend = Fragmented::new(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort", &[]);
        let mut client = Vec::new();
        let mut buf = Buffer::with_capacity(1024);
        let mut parser = ResponseStreamParser::new(1024);
        let mut state = ExchangeState::AwaitingResponse;
        let err = stream_response(&mut backend, &mut client, &mut buf, &mut parser, false, timeouts(), &mut state)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Transport(TransportError::UnexpectedEof { side: Side::Backend })
        ));
    }

    #[tokio::test]
    async fn oversized_head_aborts() {
        let mut response = b"HTTP/1.1 200 OK\r\nX-Big: ".to_vec();
        response.extend(std::iter::repeat(b'a').take(200));
        let mut backend = Fragmented::new(&response, &[]);
        let mut client = Vec::new();
        let mut buf = Buffer::with_capacity(64);
        let mut parser = ResponseStreamParser::new(64);
        let mut state = ExchangeState::AwaitingResponse;
        let err = stream_response(&mut backend, &mut client, &mut buf, &mut parser, false, timeouts(), &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Parse(ParseError::HeadersTooLarge { .. })));
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn request_body_leaves_pipelined_bytes() {
        let mut client = Fragmented::new(b"lo wor", &[]);
        let mut client_buf = Buffer::with_capacity(64);
        client_buf.space()[..3].copy_from_slice(b"hel");
        client_buf.fill(3);
        let mut backend = Vec::new();

        let sent = forward_request_body(
            &mut client,
            &mut client_buf,
            &mut backend,
            RequestBody::Length(5),
            timeouts(),
        )
        .await
        .unwrap();
        assert_eq!(sent, 5);
        assert_eq!(backend, b"hello");
        assert_eq!(client_buf.data(), b" wor");
    }

    #[tokio::test]
    async fn chunked_request_body_is_forwarded() {
        let body = b"3\r\nabc\r\n0\r\n\r\n";
        let mut pipelined = body.to_vec();
        pipelined.extend_from_slice(b"GET /next");
        let mut client = Fragmented::new(&pipelined, &[4, 6]);
        let mut client_buf = Buffer::with_capacity(64);
        let mut backend = Vec::new();

        forward_request_body(&mut client, &mut client_buf, &mut backend, RequestBody::Chunked, timeouts())
            .await
            .unwrap();
        assert_eq!(backend, body.to_vec());
    }
}
