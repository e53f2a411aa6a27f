//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, socket options)
//!     → tls.rs (optional TLS handshake)
//!     → stream.rs (plain/TLS behind one AsyncRead + AsyncWrite type)
//!     → connection.rs (lifecycle tracking for drain on stop)
//!     → Hand off to the proxy session
//! ```

pub mod connection;
pub mod listener;
pub mod stream;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use stream::Stream;
pub use tls::TlsError;
