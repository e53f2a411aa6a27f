//! Backend node abstraction.
//!
//! # Responsibilities
//! - Represent a single registered node (route, address, tuning values)
//! - Track health status (Up/Down)
//! - Track election counters for the load heuristic and stall detection

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::NodeConfig;

/// Node health status.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Up = 0,
    Down = 1,
}

impl From<u8> for NodeStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => NodeStatus::Down,
            _ => NodeStatus::Up,
        }
    }
}

/// Transport used to reach a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeProtocol {
    Plain,
    Secure,
}

/// Mutable state shared by every version of a node.
///
/// An update replaces the `Node` but keeps its `NodeState`, so exchanges
/// still holding the old `Arc<Node>` report failures against the live status.
#[derive(Debug)]
pub struct NodeState {
    status: AtomicU8,
    elected: AtomicU64,
    previous_elected: AtomicU64,
}

impl NodeState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(NodeStatus::Up as u8),
            elected: AtomicU64::new(0),
            previous_elected: AtomicU64::new(0),
        }
    }
}

/// A single backend node.
#[derive(Debug)]
pub struct Node {
    id: u64,
    config: NodeConfig,
    state: Arc<NodeState>,
}

impl Node {
    pub(crate) fn new(id: u64, config: NodeConfig) -> Self {
        Self {
            id,
            config,
            state: Arc::new(NodeState::new()),
        }
    }

    /// New version of an existing node carrying the same id and state.
    pub(crate) fn replace(previous: &Node, config: NodeConfig) -> Self {
        Self {
            id: previous.id,
            config,
            state: Arc::clone(&previous.state),
        }
    }

    /// Numeric id, stable across updates of the same route.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn route(&self) -> &str {
        &self.config.route
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// `host:port`, the connect target.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    pub fn balancer(&self) -> &str {
        &self.config.balancer
    }

    pub fn protocol(&self) -> NodeProtocol {
        if self.config.secure {
            NodeProtocol::Secure
        } else {
            NodeProtocol::Plain
        }
    }

    pub fn load(&self) -> u32 {
        self.config.load
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // --- Health ---

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from(self.state.status.load(Ordering::Acquire))
    }

    pub fn is_up(&self) -> bool {
        self.status() == NodeStatus::Up
    }

    /// Atomically move `from → to`. Returns false if the node was not in `from`.
    pub(crate) fn transition(&self, from: NodeStatus, to: NodeStatus) -> bool {
        self.state
            .status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // --- Election counters ---

    pub fn elected(&self) -> u64 {
        self.state.elected.load(Ordering::Relaxed)
    }

    pub fn previous_elected(&self) -> u64 {
        self.state.previous_elected.load(Ordering::Relaxed)
    }

    pub(crate) fn elect(&self) {
        self.state.elected.fetch_add(1, Ordering::Relaxed);
    }

    /// Elections since the last health cycle, scaled by load.
    ///
    /// Lower means less traffic relative to advertised capacity. A node with
    /// load 0 sorts last.
    pub fn lb_status(&self) -> u64 {
        let load = u64::from(self.config.load);
        if load == 0 {
            return u64::MAX;
        }
        let delta = self.elected().saturating_sub(self.previous_elected());
        delta.saturating_mul(1000) / load
    }

    /// Roll `previous_elected` forward. Returns true if nothing was elected
    /// since the last roll.
    pub(crate) fn roll_elected(&self) -> bool {
        let elected = self.elected();
        let previous = self.state.previous_elected.swap(elected, Ordering::Relaxed);
        elected == previous
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.config.route, self.config.host, self.config.port)
    }
}
