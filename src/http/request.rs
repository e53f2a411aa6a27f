//! Client request head parsing.
//!
//! # Responsibilities
//! - Parse the request line and headers once the whole head is buffered
//! - Classify the request body framing (none, Content-Length, chunked)
//! - Decide client keep-alive from version + `Connection`
//! - Expose cookies and the path for sticky-session lookup
//! - Render the upstream head with forwarding headers injected

use crate::http::ParseError;

/// Maximum number of headers accepted in a client request.
pub const MAX_HEADERS: usize = 96;

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody {
    None,
    Length(u64),
    Chunked,
}

/// A fully buffered client request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// Minor HTTP version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    pub version: u8,
    pub headers: Vec<(String, String)>,
    /// Bytes of request line + headers + blank line.
    pub head_len: usize,
    pub body: RequestBody,
    pub keep_alive: bool,
}

impl RequestHead {
    /// Parse a request head from the start of `buf`.
    ///
    /// Returns `Ok(None)` when the head is not complete yet.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(buf) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => return Err(ParseError::InvalidRequest(e.to_string())),
        };

        let version = req.version.unwrap_or(1);
        let headers: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_ascii_lowercase(),
                    String::from_utf8_lossy(h.value).trim().to_string(),
                )
            })
            .collect();

        let mut head = RequestHead {
            method: req.method.unwrap_or_default().to_string(),
            path: req.path.unwrap_or("/").to_string(),
            version,
            headers,
            head_len,
            body: RequestBody::None,
            keep_alive: false,
        };
        head.body = head.body_framing()?;
        head.keep_alive = head.wants_keep_alive();
        Ok(Some(head))
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn connection_tokens(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(n, _)| n == "connection")
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
    }

    fn wants_keep_alive(&self) -> bool {
        let mut close = false;
        let mut keep_alive = false;
        for token in self.connection_tokens() {
            if token.eq_ignore_ascii_case("close") {
                close = true;
            } else if token.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }
        if close {
            false
        } else if self.version == 0 {
            keep_alive
        } else {
            true
        }
    }

    fn body_framing(&self) -> Result<RequestBody, ParseError> {
        if let Some(te) = self.header("transfer-encoding") {
            let last = te.rsplit(',').next().unwrap_or("").trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(RequestBody::Chunked);
            }
            return Err(ParseError::InvalidRequest(format!(
                "unsupported transfer-encoding '{}'",
                te
            )));
        }
        match self.header("content-length") {
            Some(value) => {
                let len = value.parse::<u64>().map_err(|_| {
                    ParseError::InvalidRequest(format!("invalid content-length '{}'", value))
                })?;
                Ok(if len == 0 { RequestBody::None } else { RequestBody::Length(len) })
            }
            None => Ok(RequestBody::None),
        }
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }

    /// Iterate `(name, value)` pairs of every `Cookie` header.
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(n, _)| n == "cookie")
            .flat_map(|(_, v)| v.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                Some((name.trim(), value.trim().trim_matches('"')))
            })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Value of a `;name=value` path parameter, as used for URL-encoded sessions.
    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        let path = self.path.split('?').next().unwrap_or("");
        path.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.eq_ignore_ascii_case(name) {
                Some(value.split('/').next().unwrap_or(value))
            } else {
                None
            }
        })
    }

    /// Render the head to send upstream.
    ///
    /// The backend connection outlives the client's, so the request goes up
    /// as HTTP/1.1 with `Connection: keep-alive`. The client's hop-by-hop
    /// headers (`Connection`, `Keep-Alive`, `Proxy-Connection` and any header
    /// its `Connection` names) are dropped, end-to-end header lines are kept
    /// byte for byte, and `extra` is appended.
    pub fn upstream_head(&self, raw: &[u8], extra: &[(&str, &str)]) -> Vec<u8> {
        let head = &raw[..self.head_len.min(raw.len())];
        let mut out = Vec::with_capacity(head.len() + 64 * (extra.len() + 1));
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        // Skip the request line, stop at the blank line.
        for line in head.split(|&b| b == b'\n').skip(1) {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                break;
            }
            let name = line.split(|&b| b == b':').next().unwrap_or(line);
            let name = String::from_utf8_lossy(name);
            if self.is_hop_by_hop(name.trim()) {
                continue;
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"Connection: keep-alive\r\n");
        for (name, value) in extra {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    fn is_hop_by_hop(&self, name: &str) -> bool {
        const ALWAYS: [&str; 3] = ["connection", "keep-alive", "proxy-connection"];
        // Message framing stays even if a client lists it in `Connection`.
        const FRAMING: [&str; 3] = ["host", "content-length", "transfer-encoding"];

        if ALWAYS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            return true;
        }
        if FRAMING.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            return false;
        }
        self.connection_tokens().any(|token| token.eq_ignore_ascii_case(name))
    }
}
