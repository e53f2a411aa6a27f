//! Incremental parser for backend response heads.
//!
//! # Responsibilities
//! - Consume the status line and header block in arbitrarily fragmented chunks
//! - Produce the same head and `header_length` however the bytes were split
//! - Flag chunked transfer-encoding and capture Content-Length / Connection
//!
//! # Design Decisions
//! - Byte-at-a-time state machine; no lookahead across `feed` calls
//! - Lenient: a malformed status code parses as whatever digits were seen
//!   (possibly 0) and a header line without `:` is dropped
//! - Header names are lower-cased into the accumulator, the input is not touched
//! - The only hard failure is a head longer than `max_header_size`

use crate::http::ParseError;

/// Coarse parser phase. Only moves forward until `recycle()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    StatusLine,
    Headers,
    Done,
}

/// Position inside the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    LeadingBlank,
    Protocol,
    BeforeCode,
    Code,
    BeforeMessage,
    Message,
    StatusLf,
    LineStart,
    Name,
    BeforeValue,
    Value,
    HeaderLf,
    BlankLf,
}

/// A parsed response status line and header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub protocol: String,
    pub status: u16,
    pub message: String,
    /// Lower-cased names, in arrival order. Duplicates are kept.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, case-insensitive.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn add_header(&mut self, name: String, value: String) {
        self.headers.push((name, value));
    }
}

/// Streaming status-line + header parser, reused across keep-alive cycles.
#[derive(Debug)]
pub struct ResponseStreamParser {
    phase: Phase,
    step: Step,
    head: ResponseHead,
    token: Vec<u8>,
    name: Vec<u8>,
    value: Vec<u8>,
    consumed: usize,
    header_length: usize,
    max_header_size: usize,
    chunked: bool,
    content_length: Option<u64>,
    connection_close: bool,
    connection_keep_alive: bool,
}

impl ResponseStreamParser {
    pub fn new(max_header_size: usize) -> Self {
        Self {
            phase: Phase::StatusLine,
            step: Step::LeadingBlank,
            head: ResponseHead::default(),
            token: Vec::new(),
            name: Vec::new(),
            value: Vec::new(),
            consumed: 0,
            header_length: 0,
            max_header_size,
            chunked: false,
            content_length: None,
            connection_close: false,
            connection_keep_alive: false,
        }
    }

    /// Feed the next chunk of the response.
    ///
    /// Returns `Ok(Some(offset))` once the header block is complete, where
    /// `offset` is the index in `chunk` of the first body byte, and `Ok(None)`
    /// while more bytes are needed. Feeding a parser that is already `Done`
    /// consumes nothing and returns `Some(0)`.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<usize>, ParseError> {
        if self.phase == Phase::Done {
            return Ok(Some(0));
        }

        let mut i = 0;
        while i < chunk.len() {
            // a step that changes state without consuming re-dispatches the byte
            let used = self.step(chunk[i]);
            if used {
                i += 1;
                self.consumed += 1;
            }
            if self.phase == Phase::Done {
                self.header_length = self.consumed;
                return Ok(Some(i));
            }
            if used && self.consumed >= self.max_header_size {
                return Err(ParseError::HeadersTooLarge {
                    limit: self.max_header_size,
                });
            }
        }
        Ok(None)
    }

    /// Advance by one byte. Returns false when the byte was not consumed.
    fn step(&mut self, byte: u8) -> bool {
        match self.step {
            Step::LeadingBlank => match byte {
                b'\r' | b'\n' => {}
                _ => {
                    self.step = Step::Protocol;
                    return false;
                }
            },
            Step::Protocol => match byte {
                b' ' | b'\t' => {
                    self.head.protocol = take_string(&mut self.token);
                    self.step = Step::BeforeCode;
                }
                b'\r' | b'\n' => {
                    self.head.protocol = take_string(&mut self.token);
                    self.end_status_line(byte);
                }
                _ => self.token.push(byte),
            },
            Step::BeforeCode => match byte {
                b' ' | b'\t' => {}
                _ => {
                    self.step = Step::Code;
                    return false;
                }
            },
            Step::Code => match byte {
                b'0'..=b'9' => {
                    self.head.status = self
                        .head
                        .status
                        .wrapping_mul(10)
                        .wrapping_add(u16::from(byte - b'0'));
                }
                b' ' | b'\t' => self.step = Step::BeforeMessage,
                b'\r' | b'\n' => self.end_status_line(byte),
                _ => {}
            },
            Step::BeforeMessage => match byte {
                b' ' | b'\t' => {}
                _ => {
                    self.step = Step::Message;
                    return false;
                }
            },
            Step::Message => match byte {
                b'\r' | b'\n' => self.end_status_line(byte),
                _ => self.token.push(byte),
            },
            Step::StatusLf => {
                self.step = Step::LineStart;
                if byte != b'\n' {
                    return false;
                }
            }
            Step::LineStart => match byte {
                b'\r' => self.step = Step::BlankLf,
                b'\n' => self.phase = Phase::Done,
                _ => {
                    self.step = Step::Name;
                    return false;
                }
            },
            Step::Name => match byte {
                b':' => self.step = Step::BeforeValue,
                b'\r' | b'\n' => {
                    // no colon: not a header, drop the line
                    self.name.clear();
                    self.end_header_line(byte);
                }
                _ => self.name.push(byte.to_ascii_lowercase()),
            },
            Step::BeforeValue => match byte {
                b' ' | b'\t' => {}
                _ => {
                    self.step = Step::Value;
                    return false;
                }
            },
            Step::Value => match byte {
                b'\r' | b'\n' => {
                    self.register_header();
                    self.end_header_line(byte);
                }
                _ => self.value.push(byte),
            },
            Step::HeaderLf => {
                self.step = Step::LineStart;
                if byte != b'\n' {
                    return false;
                }
            }
            Step::BlankLf => {
                self.phase = Phase::Done;
                // a lone CR still ends the head; the next byte is body
                return byte == b'\n';
            }
        }
        true
    }

    fn end_status_line(&mut self, byte: u8) {
        if self.step == Step::Message {
            self.head.message = take_string(&mut self.token).trim_end().to_string();
        }
        self.phase = Phase::Headers;
        self.step = if byte == b'\r' { Step::StatusLf } else { Step::LineStart };
    }

    fn end_header_line(&mut self, byte: u8) {
        self.step = if byte == b'\r' { Step::HeaderLf } else { Step::LineStart };
    }

    fn register_header(&mut self) {
        let name = take_string(&mut self.name).trim().to_string();
        if name.is_empty() {
            self.value.clear();
            return;
        }
        let value = take_string(&mut self.value).trim_end().to_string();

        match name.as_str() {
            "transfer-encoding" => {
                let last = value.rsplit(',').next().unwrap_or("").trim();
                if last.eq_ignore_ascii_case("chunked") {
                    self.chunked = true;
                }
            }
            "content-length" => {
                if let Ok(len) = value.trim().parse::<u64>() {
                    self.content_length = Some(len);
                }
            }
            "connection" => {
                for token in value.split(',').map(str::trim) {
                    if token.eq_ignore_ascii_case("close") {
                        self.connection_close = true;
                    } else if token.eq_ignore_ascii_case("keep-alive") {
                        self.connection_keep_alive = true;
                    }
                }
            }
            _ => {}
        }
        self.head.add_header(name, value);
    }

    /// Reset for the next response. Called once per exchange reset.
    pub fn recycle(&mut self) {
        self.phase = Phase::StatusLine;
        self.step = Step::LeadingBlank;
        self.head = ResponseHead::default();
        self.token.clear();
        self.name.clear();
        self.value.clear();
        self.consumed = 0;
        self.header_length = 0;
        self.chunked = false;
        self.content_length = None;
        self.connection_close = false;
        self.connection_keep_alive = false;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    /// Total bytes of status line + headers + blank line.
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Whether the backend allows reuse of its connection after this response.
    pub fn keep_alive(&self) -> bool {
        if self.connection_close {
            return false;
        }
        if self.head.protocol.eq_ignore_ascii_case("HTTP/1.0") {
            return self.connection_keep_alive;
        }
        true
    }

    /// Whether the backend asked to close the connection.
    pub fn connection_close(&self) -> bool {
        self.connection_close
    }
}

fn take_string(bytes: &mut Vec<u8>) -> String {
    let s = String::from_utf8_lossy(bytes).into_owned();
    bytes.clear();
    s
}
