//! Concurrent node registry.
//!
//! # Responsibilities
//! - Hold the current node list (lock-free snapshot for readers)
//! - Hold the balancer definitions referenced by nodes
//! - Select a node for a request (sticky first, then least `lb_status`)
//! - Apply node status transitions and wake the health checker

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Notify;

use crate::cluster::balancer::{route_from_session, Balancer};
use crate::cluster::node::{Node, NodeStatus};
use crate::config::{BalancerConfig, NodeConfig};
use crate::http::RequestHead;
use crate::observability::metrics;

/// Why no node could be chosen for a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no node available")]
    NoNodeAvailable,
    #[error("sticky node '{route}' unavailable")]
    StickyNodeUnavailable { route: String },
}

/// Registry of nodes and balancers, shared by exchanges, the health checker
/// and the admin API.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: ArcSwap<Vec<Arc<Node>>>,
    balancers: DashMap<String, Balancer>,
    /// Serializes writers; readers only load the snapshot.
    write_lock: Mutex<()>,
    next_id: AtomicU64,
    health_wake: Notify,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
            balancers: DashMap::new(),
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            health_wake: Notify::new(),
        }
    }

    /// Build a registry from configuration.
    pub fn from_config(balancers: &[BalancerConfig], nodes: &[NodeConfig]) -> Self {
        let registry = Self::new();
        for balancer in balancers {
            registry.add_or_update_balancer(balancer.clone());
        }
        for node in nodes {
            registry.add_or_update_node(node.clone());
        }
        registry
    }

    fn write_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is `()`, a poisoned lock carries no broken state.
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Nodes ---

    /// Insert a node, or replace the node with the same route.
    ///
    /// A replaced node keeps its numeric id, status and election counters.
    pub fn add_or_update_node(&self, config: NodeConfig) -> Arc<Node> {
        let _guard = self.write_guard();
        self.ensure_balancer(&config.balancer);

        let current = self.nodes.load_full();
        let mut next: Vec<Arc<Node>> = Vec::with_capacity(current.len() + 1);
        let mut inserted = None;

        for node in current.iter() {
            if node.route() == config.route {
                let updated = Arc::new(Node::replace(node, config.clone()));
                inserted = Some(Arc::clone(&updated));
                next.push(updated);
            } else {
                next.push(Arc::clone(node));
            }
        }

        let node = match inserted {
            Some(node) => {
                tracing::info!(node = %node, id = node.id(), "Node updated");
                node
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let node = Arc::new(Node::new(id, config));
                tracing::info!(node = %node, id, "Node added");
                next.push(Arc::clone(&node));
                node
            }
        };

        self.nodes.store(Arc::new(next));
        metrics::record_node_status(node.route(), node.is_up());
        node
    }

    /// Remove a node by route. Exchanges holding it finish normally.
    pub fn remove_node(&self, route: &str) -> Option<Arc<Node>> {
        let _guard = self.write_guard();
        let current = self.nodes.load_full();
        let removed = current.iter().find(|n| n.route() == route).cloned()?;
        let next: Vec<Arc<Node>> = current
            .iter()
            .filter(|n| n.route() != route)
            .cloned()
            .collect();
        self.nodes.store(Arc::new(next));
        tracing::info!(node = %removed, "Node removed");
        Some(removed)
    }

    pub fn node(&self, route: &str) -> Option<Arc<Node>> {
        self.nodes.load().iter().find(|n| n.route() == route).cloned()
    }

    pub fn node_by_id(&self, id: u64) -> Option<Arc<Node>> {
        self.nodes.load().iter().find(|n| n.id() == id).cloned()
    }

    /// Snapshot of the current node list.
    pub fn nodes(&self) -> Arc<Vec<Arc<Node>>> {
        self.nodes.load_full()
    }

    // --- Balancers ---

    pub fn add_or_update_balancer(&self, config: BalancerConfig) {
        tracing::debug!(balancer = %config.name, "Balancer registered");
        self.balancers
            .insert(config.name.clone(), Balancer::new(config));
    }

    pub fn balancer(&self, name: &str) -> Option<Balancer> {
        self.balancers.get(name).map(|b| b.value().clone())
    }

    pub fn balancers(&self) -> Vec<Balancer> {
        let mut all: Vec<Balancer> = self.balancers.iter().map(|b| b.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    fn ensure_balancer(&self, name: &str) {
        if !self.balancers.contains_key(name) {
            tracing::debug!(balancer = %name, "Creating default balancer for node reference");
            self.balancers
                .entry(name.to_string())
                .or_insert_with(|| Balancer::named(name));
        }
    }

    /// Apply a full configuration: update balancers and nodes, drop nodes no
    /// longer listed. Returns the removed nodes so their pools can be drained.
    pub fn reconcile(&self, balancers: &[BalancerConfig], nodes: &[NodeConfig]) -> Vec<Arc<Node>> {
        for balancer in balancers {
            if self.balancer(&balancer.name).as_ref().map(Balancer::config) != Some(balancer) {
                self.add_or_update_balancer(balancer.clone());
            }
        }
        for node in nodes {
            let unchanged = self.node(&node.route).map(|n| n.config() == node).unwrap_or(false);
            if !unchanged {
                self.add_or_update_node(node.clone());
            }
        }

        let keep: HashSet<&str> = nodes.iter().map(|n| n.route.as_str()).collect();
        let stale: Vec<String> = self
            .nodes()
            .iter()
            .filter(|n| !keep.contains(n.route()))
            .map(|n| n.route().to_string())
            .collect();
        stale.iter().filter_map(|route| self.remove_node(route)).collect()
    }

    // --- Selection ---

    /// Least-loaded UP node, counting the election.
    ///
    /// The winner has the LOWEST `lb_status`, i.e. the fewest elections since
    /// the last health cycle relative to its `load`. Electing the highest
    /// would keep picking the node that was just picked. Ties go to the
    /// earlier node in list order.
    pub fn select(&self) -> Option<Arc<Node>> {
        let nodes = self.nodes.load();
        let chosen = nodes
            .iter()
            .filter(|n| n.is_up())
            .min_by_key(|n| n.lb_status())
            .cloned()?;
        chosen.elect();
        Some(chosen)
    }

    /// Node named by the route suffix of a session value, if it is UP.
    pub fn select_sticky(&self, session_value: &str) -> Option<Arc<Node>> {
        let route = route_from_session(session_value)?;
        let node = self.node(route)?;
        if !node.is_up() {
            return None;
        }
        node.elect();
        Some(node)
    }

    /// Choose the node for a request: sticky route first (per balancer
    /// policy), then the least-loaded node.
    pub fn resolve(&self, request: &RequestHead) -> Result<Arc<Node>, SelectError> {
        for entry in self.balancers.iter() {
            let balancer = entry.value();
            let Some(value) = balancer.session_value(request) else {
                continue;
            };
            let Some(route) = route_from_session(value) else {
                continue;
            };
            let Some(node) = self.node(route) else {
                continue;
            };
            if node.balancer() != balancer.name() {
                continue;
            }
            if let Some(node) = self.select_sticky(value) {
                return Ok(node);
            }
            if balancer.sticky_force() {
                tracing::debug!(route = %node.route(), "Sticky node down, forced stickiness");
                return Err(SelectError::StickyNodeUnavailable {
                    route: node.route().to_string(),
                });
            }
            tracing::debug!(route = %node.route(), "Sticky node down, falling back");
        }
        self.select().ok_or(SelectError::NoNodeAvailable)
    }

    // --- Status ---

    /// Mark a node DOWN and wake the health checker.
    pub fn mark_down(&self, node: &Node) -> bool {
        let changed = node.transition(NodeStatus::Up, NodeStatus::Down);
        if changed {
            tracing::warn!(node = %node, "Node marked DOWN");
            metrics::record_node_status(node.route(), false);
            self.health_wake.notify_one();
        }
        changed
    }

    pub fn mark_up(&self, node: &Node) -> bool {
        let changed = node.transition(NodeStatus::Down, NodeStatus::Up);
        if changed {
            tracing::info!(node = %node, "Node marked UP");
            metrics::record_node_status(node.route(), true);
        }
        changed
    }

    /// Wakes the health checker early when a node goes DOWN.
    pub fn health_wake(&self) -> &Notify {
        &self.health_wake
    }
}
