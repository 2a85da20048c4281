// WebSocket handlers: agent ingress and observer streams

use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::hub::{self, HubError, ObserverEvent};
use crate::models::{CommandFrame, SessionStatus};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the agent's first (auth) frame.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent when the shared secret does not match.
const AUTH_REJECT_CODE: u16 = 4001;

// ---- agent ingress -------------------------------------------------------

pub(super) async fn ws_agent(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_agent_session(socket, state, &id).await {
            tracing::info!(agent = %id, error = %e, "agent session refused");
        }
    })
}

/// Owns the read side of one agent connection: auth, register, frame loop,
/// teardown. Teardown is epoch-guarded in the registry, so racing with a
/// replacement connection or the liveness sweep stays idempotent.
async fn run_agent_session(
    mut socket: WebSocket,
    state: AppState,
    id: &str,
) -> Result<(), HubError> {
    // The first frame must carry the shared secret; anything else closes the
    // socket before a session exists.
    let authed = match timeout(AUTH_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            auth_ok(text.as_str(), &state.config.hub.agent_secret)
        }
        _ => false,
    };
    if !authed {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: AUTH_REJECT_CODE,
                reason: "auth rejected".into(),
            })))
            .await;
        return Err(HubError::AuthRejected);
    }

    let (cmd_tx, mut cmd_rx) =
        mpsc::channel::<CommandFrame>(state.config.hub.command_channel_capacity);
    let epoch = state.registry.register(id, cmd_tx).await;
    tracing::info!(agent = %id, "agent connected");

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match hub::parse_frame(text.as_str()) {
                            Ok(frame) => {
                                state
                                    .registry
                                    .update_snapshot(id, epoch, frame, text.as_str())
                                    .await;
                            }
                            // Bad frame: drop it, keep the prior snapshot,
                            // stay online. One agent's garbage never kills
                            // its own session, let alone anyone else's.
                            Err(e) => {
                                tracing::warn!(agent = %id, error = %e, "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::info!(agent = %id, error = %e, "agent read error");
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        let json = match serde_json::to_string(&cmd) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::warn!(agent = %id, error = %e, "command serialization failed");
                                continue;
                            }
                        };
                        let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
                        if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                            break;
                        }
                    }
                    // Sender dropped: the registry replaced this connection.
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }

    if state.registry.unregister(id, epoch).await {
        tracing::info!(agent = %id, "agent disconnected");
    }
    Ok(())
}

fn auth_ok(text: &str, expected: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("secret").and_then(|s| s.as_str().map(String::from)))
        .is_some_and(|s| s == expected)
}

// ---- observer stream -----------------------------------------------------

pub(super) async fn ws_observer(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_observer_session(socket, state, &id).await {
            tracing::info!(agent = %id, error = %e, "observer stream error");
        }
    })
}

/// Push side of the hub: relays every accepted frame and status transition
/// for one agent, and routes command frames back the other way. A slow
/// observer lags on the bounded channel and loses intermediate events
/// instead of queueing unboundedly.
async fn run_observer_session(
    mut socket: WebSocket,
    state: AppState,
    id: &str,
) -> anyhow::Result<()> {
    let (mut rx, last_raw, status) = state.registry.subscribe(id).await;
    tracing::info!(agent = %id, "observer connected");

    // Welcome: last known frame if the agent has reported, else its status.
    let welcome = match last_raw {
        Some(raw) => raw.to_string(),
        None => status_json(status)?,
    };
    if send_text(&mut socket, welcome).await.is_err() {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let text = match event {
                            ObserverEvent::Frame(raw) => raw.to_string(),
                            ObserverEvent::Status(status) => status_json(status)?,
                        };
                        if send_text(&mut socket, text).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(agent = %id, skipped = n, "observer lagged, dropped intermediate events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = route_command(&state, id, text.as_str()).await;
                        if send_text(&mut socket, reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::info!(agent = %id, error = %e, "observer read error");
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!(agent = %id, "observer disconnected");
    Ok(())
}

/// Parse a command frame from the observer and route it; the issuer always
/// learns the outcome (ack or error), unlike fire-and-forget past that point.
async fn route_command(state: &AppState, id: &str, text: &str) -> String {
    let reply = match serde_json::from_str::<CommandFrame>(text) {
        Ok(cmd) => match state.registry.send_command(id, cmd).await {
            Ok(()) => serde_json::json!({ "type": "ack" }),
            Err(e) => serde_json::json!({ "type": "error", "error": e.to_string() }),
        },
        Err(e) => {
            serde_json::json!({ "type": "error", "error": format!("malformed command: {e}") })
        }
    };
    reply.to_string()
}

fn status_json(status: SessionStatus) -> anyhow::Result<String> {
    Ok(serde_json::to_string(
        &serde_json::json!({ "status": status }),
    )?)
}

async fn send_text(socket: &mut WebSocket, text: String) -> Result<(), ()> {
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(text.into()))).await;
    if r.is_err() || r.unwrap_or(Ok(())).is_err() {
        return Err(());
    }
    Ok(())
}
