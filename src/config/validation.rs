//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. All errors are
//! collected rather than stopping at the first one.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{NodeConfig, ProxyConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    ZeroBufferSize,
    ZeroMaxConnections,
    ZeroHealthInterval,
    EmptyRoute,
    DuplicateRoute(String),
    DuplicateBalancer(String),
    EmptyHost(String),
    InvalidPort(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => write!(f, "invalid bind address '{}'", addr),
            ValidationError::ZeroBufferSize => write!(f, "buffers.buffer_size must be > 0"),
            ValidationError::ZeroMaxConnections => write!(f, "listener.max_connections must be > 0"),
            ValidationError::ZeroHealthInterval => write!(f, "health_check.interval_secs must be > 0"),
            ValidationError::EmptyRoute => write!(f, "node route must not be empty"),
            ValidationError::DuplicateRoute(route) => write!(f, "duplicate node route '{}'", route),
            ValidationError::DuplicateBalancer(name) => write!(f, "duplicate balancer '{}'", name),
            ValidationError::EmptyHost(route) => write!(f, "node '{}' has an empty host", route),
            ValidationError::InvalidPort(route) => write!(f, "node '{}' has port 0", route),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for addr in [&config.listener.bind_address, &config.admin.bind_address] {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBindAddress(addr.clone()));
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidBindAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if config.buffers.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroHealthInterval);
    }

    let mut balancers = HashSet::new();
    for balancer in &config.balancers {
        if !balancers.insert(balancer.name.as_str()) {
            errors.push(ValidationError::DuplicateBalancer(balancer.name.clone()));
        }
    }

    let mut routes = HashSet::new();
    for node in &config.nodes {
        if node.route.is_empty() {
            errors.push(ValidationError::EmptyRoute);
        } else if !routes.insert(node.route.as_str()) {
            errors.push(ValidationError::DuplicateRoute(node.route.clone()));
        }
        errors.extend(validate_node(node));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks applied to every node record, including ones registered at runtime.
pub fn validate_node(node: &NodeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if node.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost(node.route.clone()));
    }
    if node.port == 0 {
        errors.push(ValidationError::InvalidPort(node.route.clone()));
    }
    errors
}
