//! Buffer pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Client connection opens → lease client input buffer
//! Exchange created        → lease backend input buffer
//!     ... buffers filled/drained by the forwarding pipeline ...
//! Connection closes       → lease dropped → buffer cleared → back to pool
//! ```

pub mod pool;

pub use pool::{Buffer, BufferPool, LeasedBuffer};
