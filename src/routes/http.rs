// GET/POST handlers: version, agent listing, pull-model snapshot, commands

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::hub::HubError;
use crate::models::CommandFrame;
use crate::version::{NAME, VERSION};

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/agents — every known session, online or tombstoned.
pub(super) async fn agents_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.summaries().await)
}

/// GET /api/agents/{id} — status plus latest snapshot, straight from the
/// registry (pull model; the push model is WS /ws/metrics/{id}).
pub(super) async fn agent_detail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Some(summary) = state.registry.summary(&id).await else {
        return not_found(&id);
    };
    let snapshot = state.registry.snapshot(&id).await;
    Json(serde_json::json!({
        "id": summary.id,
        "status": summary.status,
        "lastSeen": summary.last_seen,
        "framesReceived": summary.frames_received,
        "snapshot": snapshot.as_deref(),
    }))
    .into_response()
}

/// GET /api/agents/{id}/history — the rolling snapshot window, oldest first.
pub(super) async fn agent_history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.registry.summary(&id).await.is_none() {
        return not_found(&id);
    }
    let history = state.registry.history(&id).await;
    let frames: Vec<_> = history.iter().map(|f| f.as_ref()).collect();
    Json(frames).into_response()
}

/// POST /api/agents/{id}/command — one-shot command routing. At most once:
/// an offline target gets an error and nothing is queued.
pub(super) async fn agent_command_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(cmd): Json<CommandFrame>,
) -> Response {
    match state.registry.send_command(&id, cmd).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "accepted" })),
        )
            .into_response(),
        Err(e @ (HubError::NotConnected(_) | HubError::SendTimeout(_))) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("unknown agent {id}") })),
    )
        .into_response()
}
