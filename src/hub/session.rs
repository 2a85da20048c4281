// Per-agent live state, owned exclusively by the registry

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::{CommandFrame, MetricFrame, SessionStatus};

/// Event fanned out to the observers of one agent.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A metric frame, verbatim as the agent sent it.
    Frame(Arc<str>),
    /// Synthesized status transition, serialized as `{"status":...}`.
    Status(SessionStatus),
}

/// Live state for one agent. `epoch` is the connection generation: every
/// registration stamps a new one, and teardown paths only act when their
/// epoch still matches, so a replaced connection can never tear down its
/// successor.
pub(super) struct AgentSession {
    pub(super) epoch: u64,
    pub(super) status: SessionStatus,
    pub(super) last_snapshot: Option<Arc<MetricFrame>>,
    /// Raw JSON of the last accepted frame, for verbatim relay to observers.
    pub(super) last_raw: Option<Arc<str>>,
    pub(super) last_seen: u64,
    pub(super) history: VecDeque<Arc<MetricFrame>>,
    pub(super) frames_received: u64,
    /// Outbound command channel; `None` once the connection is gone.
    pub(super) cmd_tx: Option<mpsc::Sender<CommandFrame>>,
}

impl AgentSession {
    pub(super) fn new(epoch: u64, cmd_tx: mpsc::Sender<CommandFrame>, now: u64) -> Self {
        Self {
            epoch,
            status: SessionStatus::Online,
            last_snapshot: None,
            last_raw: None,
            last_seen: now,
            history: VecDeque::new(),
            frames_received: 0,
            cmd_tx: Some(cmd_tx),
        }
    }
}
