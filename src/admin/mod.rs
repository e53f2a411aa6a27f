//! Administrative HTTP API.
//!
//! Node/balancer registration and endpoint process control, behind a bearer
//! token. Every mutation goes through the same registry operations the
//! configuration watcher uses.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::proxy::{EndpointControl, ProxyContext};

#[derive(Clone)]
pub struct AdminState {
    pub ctx: Arc<ProxyContext>,
    pub endpoint: EndpointControl,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/nodes", get(get_nodes).post(put_node))
        .route("/admin/nodes/{route}", delete(delete_node))
        .route("/admin/nodes/{route}/down", post(mark_node_down))
        .route("/admin/nodes/{route}/up", post(mark_node_up))
        .route("/admin/balancers", get(get_balancers).post(put_balancer))
        .route("/admin/endpoint/{action}", post(endpoint_action))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(addr: SocketAddr, state: AdminState, mut shutdown: broadcast::Receiver<()>) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to bind admin API");
            return;
        }
    };
    tracing::info!(address = %addr, "Admin API listening");

    let result = axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "Admin API server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use crate::buffer::BufferPool;
    use crate::cluster::NodeRegistry;
    use crate::config::{NodeConfig, TimeoutConfig};
    use crate::proxy::{ConnectionManager, EndpointState};

    fn state() -> (AdminState, watch::Receiver<EndpointState>) {
        let ctx = Arc::new(ProxyContext {
            registry: Arc::new(NodeRegistry::new()),
            connections: Arc::new(ConnectionManager::new(Duration::from_secs(1), None)),
            buffers: Arc::new(BufferPool::new(1024)),
            timeouts: TimeoutConfig::default(),
        });
        ctx.apply_node(NodeConfig::new("nodeA", "127.0.0.1", 9000));
        let (endpoint, rx) = EndpointControl::detached();
        let state = AdminState {
            ctx,
            endpoint,
            api_key: Arc::from("secret"),
        };
        (state, rx)
    }

    fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", "Bearer secret");
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_token() {
        let (state, _rx) = state();
        let response = setup_admin_router(state)
            .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lists_nodes() {
        let (state, _rx) = state();
        let response = setup_admin_router(state)
            .oneshot(request("GET", "/admin/nodes", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json[0]["route"], "nodeA");
        assert_eq!(json[0]["status"], "UP");
    }

    #[tokio::test]
    async fn registers_and_removes_node() {
        let (state, _rx) = state();
        let router = setup_admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(request(
                "POST",
                "/admin/nodes",
                Some(r#"{"route":"nodeB","host":"127.0.0.1","port":9001,"balancer":"web"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.ctx.registry.node("nodeB").is_some());
        assert!(state.ctx.registry.balancer("web").is_some());

        let response = router
            .clone()
            .oneshot(request("DELETE", "/admin/nodes/nodeB", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.ctx.registry.node("nodeB").is_none());

        let response = router
            .oneshot(request("DELETE", "/admin/nodes/nodeB", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_invalid_node() {
        let (state, _rx) = state();
        let response = setup_admin_router(state)
            .oneshot(request(
                "POST",
                "/admin/nodes",
                Some(r#"{"route":"","host":"127.0.0.1","port":0}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn marks_node_down_and_up() {
        let (state, _rx) = state();
        let router = setup_admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(request("POST", "/admin/nodes/nodeA/down", None))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "DOWN");
        assert_eq!(json["changed"], true);
        assert!(state.ctx.registry.select().is_none());

        let response = router
            .oneshot(request("POST", "/admin/nodes/nodeA/up", None))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "UP");
    }

    #[tokio::test]
    async fn controls_endpoint() {
        let (state, rx) = state();
        let router = setup_admin_router(state);

        let response = router
            .clone()
            .oneshot(request("POST", "/admin/endpoint/pause", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["state"], "paused");
        assert_eq!(*rx.borrow(), EndpointState::Paused);

        let response = router
            .oneshot(request("POST", "/admin/endpoint/reboot", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
