//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → nodes/balancers fed to NodeRegistry::add_or_update_*
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → NodeRegistry::reconcile applies the new node list
//! ```
//!
//! # Design Decisions
//! - Listener, buffer and timeout settings are fixed at startup
//! - Only nodes and balancers are hot-reloaded
//! - All fields have defaults to allow minimal configs

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BackendTlsConfig, BalancerConfig, BufferConfig, HealthCheckConfig,
    ListenerConfig, NodeConfig, ObservabilityConfig, ProxyConfig, RuntimeConfig, TimeoutConfig,
    TlsConfig, DEFAULT_BALANCER,
};
