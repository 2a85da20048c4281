// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::hub::SessionRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) config: AppConfig,
}

pub fn app(registry: Arc<SessionRegistry>, config: AppConfig) -> Router {
    let state = AppState { registry, config };
    Router::new()
        .route("/", get(|| async { "fleethub: agent monitoring hub" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/agents", get(http::agents_handler)) // GET /api/agents
        .route("/api/agents/{id}", get(http::agent_detail_handler)) // GET /api/agents/{id}
        .route("/api/agents/{id}/history", get(http::agent_history_handler)) // GET /api/agents/{id}/history
        .route("/api/agents/{id}/command", post(http::agent_command_handler)) // POST /api/agents/{id}/command
        .route("/ws/agent/{id}", get(ws::ws_agent)) // WS agent ingress
        .route("/ws/metrics/{id}", get(ws::ws_observer)) // WS observer stream
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
