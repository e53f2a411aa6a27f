//! Cluster-aware HTTP/1.x reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ proxy::endpoint ──▶ proxy::session ──▶ proxy::exchange ──▶ Node
//!                 (accept, TLS)      (request head,     │  ▲
//!                                     keep-alive)       │  │ http::response
//!                                                       ▼  │ (streamed relay)
//!                                     cluster::registry  proxy::pool
//!                                     (sticky / lb_status) (idle connections)
//!                                           ▲
//!                                           │ mark_down wakes
//!                                     cluster::health (TCP probes)
//!
//!     Cross-cutting: config (TOML + watcher), admin (axum API),
//!                    observability (tracing, Prometheus), lifecycle
//! ```

// Data plane
pub mod buffer;
pub mod cluster;
pub mod http;
pub mod net;
pub mod proxy;

// Control plane
pub mod admin;
pub mod config;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use cluster::NodeRegistry;
pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{Endpoint, ProxyContext};
