//! HTTP/1.x protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client bytes
//!     → request.rs (request line + headers, body framing, keep-alive)
//!     → [exchange forwards head + body upstream]
//! Backend bytes
//!     → response.rs (incremental status line + header parser)
//!     → chunked.rs (end-of-body detection for passthrough chunked bodies)
//!     → relayed to the client unchanged
//! ```

pub mod chunked;
pub mod request;
pub mod response;

use thiserror::Error;

pub use chunked::ChunkedTracker;
pub use request::{RequestBody, RequestHead, X_REQUEST_ID};
pub use response::{Phase, ResponseHead, ResponseStreamParser};

/// Protocol anomalies that cannot be absorbed leniently.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("header block exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },
    #[error("invalid chunked framing")]
    InvalidChunk,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
