//! Exchange failure taxonomy.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::cluster::SelectError;
use crate::http::ParseError;
use crate::proxy::pool::ConnectError;

/// Which connection an I/O failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Backend,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Backend => write!(f, "backend"),
        }
    }
}

/// Read/write failure or timeout on an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{side} I/O error: {source}")]
    Io {
        side: Side,
        #[source]
        source: io::Error,
    },
    #[error("{side} timed out")]
    Timeout { side: Side },
    #[error("{side} closed the connection mid-message")]
    UnexpectedEof { side: Side },
}

impl TransportError {
    pub fn io(side: Side, source: io::Error) -> Self {
        TransportError::Io { side, source }
    }

    pub fn side(&self) -> Side {
        match self {
            TransportError::Io { side, .. }
            | TransportError::Timeout { side }
            | TransportError::UnexpectedEof { side } => *side,
        }
    }
}

/// Why a single exchange failed. Never fatal to the process.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),
}

impl ExchangeError {
    /// Metric label for the failure class.
    pub fn outcome(&self) -> &'static str {
        match self {
            ExchangeError::Select(_) => "no_node",
            ExchangeError::Connect(_) => "connect_error",
            ExchangeError::Transport(e) => match e.side() {
                Side::Client => "client_error",
                Side::Backend => "backend_error",
            },
            ExchangeError::Parse(_) => "parse_error",
        }
    }
}
