// Integration tests: HTTP and WebSocket endpoints

use axum_test::TestServer;
use fleethub::config::AppConfig;
use fleethub::hub::SessionRegistry;
use fleethub::models::AgentSummary;
use fleethub::routes;
use std::sync::Arc;

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[hub]
agent_secret = "test-secret"
history_capacity = 20
broadcast_capacity = 32
command_channel_capacity = 16
offline_after_secs = 10
sweep_interval_secs = 5
stats_log_interval_secs = 60
"#;

const AUTH_OK: &str = r#"{"secret":"test-secret"}"#;

fn test_app() -> axum::Router {
    let config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    let registry = Arc::new(SessionRegistry::new(
        config.hub.history_capacity,
        config.hub.broadcast_capacity,
    ));
    routes::app(registry, config)
}

/// Build TestServer with http_transport (required for WebSocket tests).
fn test_server_with_http() -> TestServer {
    TestServer::builder()
        .http_transport()
        .build(test_app())
}

// Receive until the JSON matches (the server may interleave pings and status
// events with the payload we wait for).

async fn receive_json_until(
    ws: &mut axum_test::TestWebSocket,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    loop {
        let text = ws.receive_text().await;
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&text) {
            if pred(&v) {
                return v;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for expected JSON"
        );
    }
}

/// Poll GET /api/agents/{id} until the detail satisfies the predicate.
async fn wait_for_detail(
    server: &TestServer,
    id: &str,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    loop {
        let response = server.get(&format!("/api/agents/{id}")).await;
        if response.status_code() == axum::http::StatusCode::OK {
            let v: serde_json::Value = response.json();
            if pred(&v) {
                return v;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for agent detail"
        );
        tokio::time::sleep(tokio::time::Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_root_endpoint() {
    let server = TestServer::new(test_app());
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("fleethub: agent monitoring hub");
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = TestServer::new(test_app());
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("fleethub"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_agent_with_bad_secret_is_not_registered() {
    let server = test_server_with_http();
    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(r#"{"secret":"wrong"}"#).await;

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    let agents: Vec<AgentSummary> = server.get("/api/agents").await.json();
    assert!(agents.is_empty(), "rejected agent must leave no session");
}

#[tokio::test]
async fn test_agent_frames_flow_to_observer() {
    let server = test_server_with_http();

    // observer first: it is welcomed with offline status for an unknown agent
    let mut observer = server
        .get_websocket("/ws/metrics/srv-1")
        .await
        .into_websocket()
        .await;
    let welcome = receive_json_until(&mut observer, |v| !v["status"].is_null()).await;
    assert_eq!(welcome["status"], "offline");

    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(AUTH_OK).await;
    receive_json_until(&mut observer, |v| v["status"] == "online").await;

    agent
        .send_text(
            r#"{"cpu":42,"ram":55,"time":"12:00:01","processes":[{"pid":100,"name":"x","cpu":60,"ram":10}]}"#,
        )
        .await;

    // the observer receives the frame verbatim
    let frame = receive_json_until(&mut observer, |v| !v["cpu"].is_null()).await;
    assert_eq!(frame["cpu"], 42.0);
    assert_eq!(frame["processes"][0]["pid"], 100.0);

    // the pull model agrees with the push model
    let detail = wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 42.0).await;
    assert_eq!(detail["status"], "online");
}

#[tokio::test]
async fn test_malformed_frame_keeps_prior_snapshot() {
    let server = test_server_with_http();
    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(AUTH_OK).await;
    agent.send_text(r#"{"cpu":10,"ram":20}"#).await;
    wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 10.0).await;

    agent.send_text("definitely not json").await;
    agent.send_text(r#"{"cpu":250,"ram":20}"#).await;
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    // session still online, snapshot untouched
    let detail = wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 10.0).await;
    assert_eq!(detail["status"], "online");

    // and the next good frame still lands
    agent.send_text(r#"{"cpu":20,"ram":20}"#).await;
    wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 20.0).await;
}

#[tokio::test]
async fn test_command_round_trip() {
    let server = test_server_with_http();
    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(AUTH_OK).await;
    agent
        .send_text(
            r#"{"cpu":42,"ram":55,"time":"12:00:01","processes":[{"pid":100,"name":"x","cpu":60,"ram":10}]}"#,
        )
        .await;
    wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 42.0).await;

    let response = server
        .post("/api/agents/srv-1/command")
        .json(&serde_json::json!({ "action": "kill", "pid": 100 }))
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);

    // exactly one command frame arrives at the agent, matching the payload
    let cmd = receive_json_until(&mut agent, |v| !v["action"].is_null()).await;
    assert_eq!(cmd, serde_json::json!({ "action": "kill", "pid": 100 }));

    // the relayed snapshot keeps showing pid 100 until the agent reports a
    // process list without it
    let detail = server.get("/api/agents/srv-1").await;
    let v: serde_json::Value = detail.json();
    assert_eq!(v["snapshot"]["processes"][0]["pid"], 100.0);

    agent
        .send_text(r#"{"cpu":40,"ram":54,"time":"12:00:04","processes":[]}"#)
        .await;
    wait_for_detail(&server, "srv-1", |v| {
        v["snapshot"]["processes"]
            .as_array()
            .is_some_and(|p| p.is_empty())
    })
    .await;
}

#[tokio::test]
async fn test_command_to_unknown_agent_is_conflict() {
    let server = TestServer::new(test_app());
    let response = server
        .post("/api/agents/srv-unknown/command")
        .json(&serde_json::json!({ "action": "kill", "pid": 1 }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    // no registry mutation
    let agents: Vec<AgentSummary> = server.get("/api/agents").await.json();
    assert!(agents.is_empty());
}

#[tokio::test]
async fn test_observer_command_relay_acks() {
    let server = test_server_with_http();
    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(AUTH_OK).await;
    wait_for_detail(&server, "srv-1", |v| v["status"] == "online").await;

    let mut observer = server
        .get_websocket("/ws/metrics/srv-1")
        .await
        .into_websocket()
        .await;
    observer.send_text(r#"{"action":"kill","pid":77}"#).await;
    let reply = receive_json_until(&mut observer, |v| !v["type"].is_null()).await;
    assert_eq!(reply["type"], "ack");

    let cmd = receive_json_until(&mut agent, |v| !v["action"].is_null()).await;
    assert_eq!(cmd["pid"], 77.0);

    // malformed command text gets an error reply, not a dropped socket
    observer.send_text("not a command").await;
    let reply = receive_json_until(&mut observer, |v| v["type"] == "error").await;
    assert!(
        reply["error"]
            .as_str()
            .is_some_and(|e| e.contains("malformed command"))
    );
}

#[tokio::test]
async fn test_observer_sees_offline_on_agent_disconnect() {
    let server = test_server_with_http();
    let mut observer = server
        .get_websocket("/ws/metrics/srv-1")
        .await
        .into_websocket()
        .await;
    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(AUTH_OK).await;
    agent.send_text(r#"{"cpu":5,"ram":5}"#).await;
    receive_json_until(&mut observer, |v| !v["cpu"].is_null()).await;

    drop(agent);

    receive_json_until(&mut observer, |v| v["status"] == "offline").await;
    let detail = wait_for_detail(&server, "srv-1", |v| v["status"] == "offline").await;
    // tombstone keeps last-known values
    assert_eq!(detail["snapshot"]["cpu"], 5.0);
}

#[tokio::test]
async fn test_reconnect_replaces_session() {
    let server = test_server_with_http();
    let mut first = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    first.send_text(AUTH_OK).await;
    wait_for_detail(&server, "srv-1", |v| v["status"] == "online").await;

    let mut second = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    second.send_text(AUTH_OK).await;
    second.send_text(r#"{"cpu":7,"ram":7}"#).await;
    wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 7.0).await;

    // one session for the id, and commands reach the replacement connection
    let agents: Vec<AgentSummary> = server.get("/api/agents").await.json();
    assert_eq!(agents.len(), 1);

    let response = server
        .post("/api/agents/srv-1/command")
        .json(&serde_json::json!({ "action": "kill", "pid": 9 }))
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let cmd = receive_json_until(&mut second, |v| !v["action"].is_null()).await;
    assert_eq!(cmd["pid"], 9.0);
}

#[tokio::test]
async fn test_history_endpoint_returns_rolling_window() {
    let server = test_server_with_http();
    let mut agent = server
        .get_websocket("/ws/agent/srv-1")
        .await
        .into_websocket()
        .await;
    agent.send_text(AUTH_OK).await;
    for cpu in [1, 2, 3] {
        agent.send_text(format!(r#"{{"cpu":{cpu},"ram":10}}"#)).await;
    }
    wait_for_detail(&server, "srv-1", |v| v["snapshot"]["cpu"] == 3.0).await;

    let history: serde_json::Value = server.get("/api/agents/srv-1/history").await.json();
    let cpus: Vec<f64> = history
        .as_array()
        .expect("array")
        .iter()
        .map(|f| f["cpu"].as_f64().unwrap())
        .collect();
    assert_eq!(cpus, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_unknown_agent_detail_is_not_found() {
    let server = TestServer::new(test_app());
    let response = server.get("/api/agents/nope").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
    let response = server.get("/api/agents/nope/history").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}
