// Session status and API-facing summaries

use serde::{Deserialize, Serialize};

/// Connection state of an agent session. Offline sessions are kept as
/// tombstones so dashboards can still show last-known values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Online,
    Offline,
}

/// Per-agent row for GET /api/agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub status: SessionStatus,
    /// Unix millis of the last accepted frame (or status change).
    pub last_seen: u64,
    pub frames_received: u64,
}
