//! Chunked body boundary tracking.
//!
//! Chunked bodies are relayed byte-for-byte; this tracker only watches the
//! framing go past so the proxy knows where the body ends (last chunk plus
//! trailers) and whether the connection can be reused.

use crate::http::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Extension,
    SizeLf,
    Data(u64),
    DataCr,
    DataLf,
    TrailerStart,
    Trailer,
    TrailerLf,
    EndLf,
    Done,
}

#[derive(Debug)]
pub struct ChunkedTracker {
    state: State,
    size: u64,
    digits: usize,
}

impl Default for ChunkedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedTracker {
    pub fn new() -> Self {
        Self {
            state: State::Size,
            size: 0,
            digits: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Observe the next slice of body bytes.
    ///
    /// Returns `Some(n)` when the body ends after the first `n` bytes of
    /// `bytes`; anything past `n` does not belong to this message.
    pub fn observe(&mut self, bytes: &[u8]) -> Result<Option<usize>, ParseError> {
        let mut i = 0;
        while i < bytes.len() {
            if self.state == State::Done {
                return Ok(Some(i));
            }
            if let State::Data(remaining) = self.state {
                let take = remaining.min((bytes.len() - i) as u64);
                i += take as usize;
                let left = remaining - take;
                self.state = if left == 0 { State::DataCr } else { State::Data(left) };
                continue;
            }
            self.step(bytes[i])?;
            i += 1;
        }
        Ok(if self.state == State::Done { Some(i) } else { None })
    }

    fn step(&mut self, byte: u8) -> Result<(), ParseError> {
        self.state = match self.state {
            State::Size => match byte {
                b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' => {
                    // 16 hex digits overflow a u64
                    if self.digits == 16 {
                        return Err(ParseError::InvalidChunk);
                    }
                    let digit = (byte as char).to_digit(16).unwrap_or(0) as u64;
                    self.size = self.size * 16 + digit;
                    self.digits += 1;
                    State::Size
                }
                b';' | b' ' | b'\t' => State::Extension,
                b'\r' => State::SizeLf,
                b'\n' => self.end_of_size()?,
                _ => return Err(ParseError::InvalidChunk),
            },
            State::Extension => match byte {
                b'\r' => State::SizeLf,
                b'\n' => self.end_of_size()?,
                _ => State::Extension,
            },
            State::SizeLf => match byte {
                b'\n' => self.end_of_size()?,
                _ => return Err(ParseError::InvalidChunk),
            },
            State::DataCr => match byte {
                b'\r' => State::DataLf,
                b'\n' => State::Size,
                _ => return Err(ParseError::InvalidChunk),
            },
            State::DataLf => match byte {
                b'\n' => State::Size,
                _ => return Err(ParseError::InvalidChunk),
            },
            State::TrailerStart => match byte {
                b'\r' => State::EndLf,
                b'\n' => State::Done,
                _ => State::Trailer,
            },
            State::Trailer => match byte {
                b'\r' => State::TrailerLf,
                b'\n' => State::TrailerStart,
                _ => State::Trailer,
            },
            State::TrailerLf => match byte {
                b'\n' => State::TrailerStart,
                _ => State::Trailer,
            },
            State::EndLf => match byte {
                b'\n' => State::Done,
                _ => return Err(ParseError::InvalidChunk),
            },
            State::Data(_) | State::Done => self.state,
        };
        Ok(())
    }

    fn end_of_size(&mut self) -> Result<State, ParseError> {
        if self.digits == 0 {
            return Err(ParseError::InvalidChunk);
        }
        let size = self.size;
        self.size = 0;
        self.digits = 0;
        Ok(if size == 0 { State::TrailerStart } else { State::Data(size) })
    }
}
