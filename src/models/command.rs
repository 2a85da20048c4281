// Control commands routed hub -> agent

use serde::{Deserialize, Serialize};

/// What the agent should do; serializes to the lowercase wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Kill,
}

/// One command frame, e.g. `{"action":"kill","pid":1234}`.
/// Transient: delivered at most once, never persisted or re-queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub action: CommandAction,
    pub pid: u32,
}
