//! Cluster membership subsystem.
//!
//! # Data Flow
//! ```text
//! Config / Admin API
//!     → registry.rs (add/update/remove nodes and balancers)
//! Exchange
//!     → registry.rs (sticky lookup via balancer.rs, else least lb_status)
//!     → on connect failure: mark_down → wakes health.rs
//! health.rs
//!     → TCP probe of DOWN nodes → mark_up
//! ```

pub mod balancer;
pub mod health;
pub mod node;
pub mod registry;

pub use balancer::{route_from_session, Balancer};
pub use health::{CycleReport, HealthChecker};
pub use node::{Node, NodeProtocol, NodeStatus};
pub use registry::{NodeRegistry, SelectError};
