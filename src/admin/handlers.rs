use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::admin::AdminState;
use crate::cluster::{Node, NodeProtocol, NodeStatus};
use crate::config::validation::validate_node;
use crate::config::{BalancerConfig, NodeConfig};
use crate::proxy::EndpointState;

type ApiError = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub endpoint: EndpointState,
    pub nodes: usize,
    pub nodes_up: usize,
    pub idle_backend_connections: usize,
    pub buffers_allocated: usize,
    pub buffers_idle: usize,
}

#[derive(Serialize)]
pub struct NodeView {
    pub id: u64,
    pub route: String,
    pub host: String,
    pub port: u16,
    pub balancer: String,
    pub protocol: NodeProtocol,
    pub status: NodeStatus,
    pub load: u32,
    pub elected: u64,
    pub lb_status: u64,
    pub idle_connections: usize,
}

#[derive(Serialize)]
pub struct BalancerView {
    pub name: String,
    pub sticky_session: bool,
    pub sticky_session_cookie: String,
    pub sticky_session_force: bool,
    pub max_attempts: u32,
}

#[derive(Serialize)]
pub struct Transition {
    pub route: String,
    pub status: NodeStatus,
    pub changed: bool,
}

fn node_view(state: &AdminState, node: &Node) -> NodeView {
    NodeView {
        id: node.id(),
        route: node.route().to_string(),
        host: node.host().to_string(),
        port: node.port(),
        balancer: node.balancer().to_string(),
        protocol: node.protocol(),
        status: node.status(),
        load: node.load(),
        elected: node.elected(),
        lb_status: node.lb_status(),
        idle_connections: state.ctx.connections.idle_count(node.id()),
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let nodes = state.ctx.registry.nodes();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        endpoint: state.endpoint.state(),
        nodes: nodes.len(),
        nodes_up: nodes.iter().filter(|n| n.is_up()).count(),
        idle_backend_connections: state.ctx.connections.total_idle(),
        buffers_allocated: state.ctx.buffers.allocated(),
        buffers_idle: state.ctx.buffers.idle(),
    })
}

pub async fn get_nodes(State(state): State<AdminState>) -> Json<Vec<NodeView>> {
    let nodes = state.ctx.registry.nodes();
    Json(nodes.iter().map(|n| node_view(&state, n)).collect())
}

pub async fn put_node(
    State(state): State<AdminState>,
    Json(config): Json<NodeConfig>,
) -> Result<Json<NodeView>, ApiError> {
    let errors = validate_node(&config);
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(error(StatusCode::BAD_REQUEST, messages.join("; ")));
    }
    let node = state.ctx.apply_node(config);
    Ok(Json(node_view(&state, &node)))
}

pub async fn delete_node(
    State(state): State<AdminState>,
    Path(route): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.ctx.remove_node(&route) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(error(StatusCode::NOT_FOUND, format!("unknown node '{}'", route))),
    }
}

pub async fn mark_node_down(
    State(state): State<AdminState>,
    Path(route): Path<String>,
) -> Result<Json<Transition>, ApiError> {
    let node = state
        .ctx
        .registry
        .node(&route)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown node '{}'", route)))?;
    let changed = state.ctx.registry.mark_down(&node);
    Ok(Json(Transition {
        route,
        status: node.status(),
        changed,
    }))
}

pub async fn mark_node_up(
    State(state): State<AdminState>,
    Path(route): Path<String>,
) -> Result<Json<Transition>, ApiError> {
    let node = state
        .ctx
        .registry
        .node(&route)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown node '{}'", route)))?;
    let changed = state.ctx.registry.mark_up(&node);
    Ok(Json(Transition {
        route,
        status: node.status(),
        changed,
    }))
}

pub async fn get_balancers(State(state): State<AdminState>) -> Json<Vec<BalancerView>> {
    Json(
        state
            .ctx
            .registry
            .balancers()
            .iter()
            .map(|b| BalancerView {
                name: b.name().to_string(),
                sticky_session: b.sticky_session(),
                sticky_session_cookie: b.sticky_cookie().to_string(),
                sticky_session_force: b.sticky_force(),
                max_attempts: b.max_attempts(),
            })
            .collect(),
    )
}

pub async fn put_balancer(
    State(state): State<AdminState>,
    Json(config): Json<BalancerConfig>,
) -> Result<StatusCode, ApiError> {
    if config.name.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "balancer name must not be empty"));
    }
    state.ctx.registry.add_or_update_balancer(config);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn endpoint_action(
    State(state): State<AdminState>,
    Path(action): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let changed = match action.as_str() {
        "pause" => state.endpoint.pause(),
        "resume" => state.endpoint.resume(),
        "stop" => {
            state.endpoint.stop();
            true
        }
        other => {
            return Err(error(StatusCode::NOT_FOUND, format!("unknown action '{}'", other)));
        }
    };
    tracing::info!(action = %action, changed, "Endpoint control");
    Ok(Json(json!({ "state": state.endpoint.state(), "changed": changed })))
}
