//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the cluster proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Worker pool sizing.
    pub runtime: RuntimeConfig,

    /// Pooled buffer sizing.
    pub buffers: BufferConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Trust roots for secure (TLS) nodes.
    pub backend_tls: BackendTlsConfig,

    /// Balancer (sticky-session policy) definitions.
    pub balancers: Vec<BalancerConfig>,

    /// Initial node list.
    pub nodes: Vec<NodeConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Set TCP_NODELAY on accepted connections.
    pub nodelay: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
            nodelay: true,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of worker threads. `None` uses one per CPU.
    pub worker_threads: Option<usize>,
}

/// Buffer pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Fixed capacity of every pooled buffer, in bytes.
    /// Also bounds the size of a request or response head.
    pub buffer_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
        }
    }
}

/// Timeout configuration for I/O operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Timeout for a single read in seconds.
    pub read_secs: u64,

    /// Timeout for a single write in seconds.
    pub write_secs: u64,

    /// How long an idle client connection waits for its next request.
    pub keep_alive_secs: u64,

    /// How long a stopping endpoint waits for client connections to finish.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            read_secs: 30,
            write_secs: 30,
            keep_alive_secs: 60,
            drain_secs: 10,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background checker.
    pub enabled: bool,

    /// Polling interval in seconds. `mark_down` wakes the checker early.
    pub interval_secs: u64,

    /// Timeout for a single TCP probe in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            probe_timeout_secs: 2,
        }
    }
}

/// Trust configuration used when connecting to secure nodes.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackendTlsConfig {
    /// PEM bundle of CA certificates trusted for secure nodes.
    pub ca_path: Option<String>,
}

/// A named sticky-session policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BalancerConfig {
    /// Balancer name referenced by nodes.
    pub name: String,

    /// Honor sticky-session cookies.
    pub sticky_session: bool,

    /// Cookie carrying `<session>.<route>`.
    pub sticky_session_cookie: String,

    /// Path parameter carrying `<session>.<route>` when no cookie is present.
    pub sticky_session_path: String,

    /// Fail instead of falling back when the sticky node is unavailable.
    pub sticky_session_force: bool,

    /// Attempts allowed per request.
    pub max_attempts: u32,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BALANCER.to_string(),
            sticky_session: true,
            sticky_session_cookie: "JSESSIONID".to_string(),
            sticky_session_path: "jsessionid".to_string(),
            sticky_session_force: false,
            max_attempts: 1,
        }
    }
}

/// Balancer assigned to nodes that do not name one.
pub const DEFAULT_BALANCER: &str = "mycluster";

/// A backend node registration record.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Unique route identifier (the sticky cookie suffix).
    pub route: String,

    /// Hostname or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Balancer this node belongs to.
    #[serde(default = "default_balancer")]
    pub balancer: String,

    /// Connect with TLS.
    #[serde(default)]
    pub secure: bool,

    /// Advertised load factor; higher means more capacity.
    #[serde(default = "default_load")]
    pub load: u32,

    /// Disable Nagle (TCP_NODELAY) on connections to this node so small
    /// writes go out immediately.
    #[serde(default)]
    pub flush_packets: bool,

    /// Ping interval advertised by the node. Recorded, not acted on.
    #[serde(default = "default_ping_secs")]
    pub ping_secs: u64,

    /// Idle connection time-to-live advertised by the node. Recorded only;
    /// pooled connections do not expire.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Read/write timeout for exchanges with this node, replacing
    /// `timeouts.read_secs`/`write_secs` (0 = proxy default).
    #[serde(default)]
    pub timeout_secs: u64,
}

impl NodeConfig {
    /// Minimal record with defaults for the tuning values.
    pub fn new(route: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            route: route.into(),
            host: host.into(),
            port,
            balancer: default_balancer(),
            secure: false,
            load: default_load(),
            flush_packets: false,
            ping_secs: default_ping_secs(),
            ttl_secs: default_ttl_secs(),
            timeout_secs: 0,
        }
    }
}

fn default_balancer() -> String {
    DEFAULT_BALANCER.to_string()
}

fn default_load() -> u32 {
    100
}

fn default_ping_secs() -> u64 {
    10
}

fn default_ttl_secs() -> u64 {
    60
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
