// Session registry: the single shared mutable resource of the hub.
// All mutation happens inside short lock sections; no await under the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};

use super::error::HubError;
use super::session::{AgentSession, ObserverEvent};
use crate::models::{AgentSummary, CommandFrame, MetricFrame, SessionStatus};

/// How long a command send may wait on a full outbound channel before the
/// connection is treated as dead.
pub const COMMAND_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters reported by the stats log tick.
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    pub agents_online: usize,
    pub agents_total: usize,
    pub frames_received_total: u64,
}

struct Inner {
    sessions: HashMap<String, AgentSession>,
    /// Observer fan-out, one channel per agent id. Created lazily on either
    /// side so observers may attach before their agent ever connects.
    channels: HashMap<String, broadcast::Sender<ObserverEvent>>,
}

pub struct SessionRegistry {
    inner: Mutex<Inner>,
    next_epoch: AtomicU64,
    frames_received_total: AtomicU64,
    history_capacity: usize,
    broadcast_capacity: usize,
}

impl SessionRegistry {
    pub fn new(history_capacity: usize, broadcast_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                channels: HashMap::new(),
            }),
            next_epoch: AtomicU64::new(0),
            frames_received_total: AtomicU64::new(0),
            history_capacity,
            broadcast_capacity,
        }
    }

    /// Register a connection for `id` and return its epoch.
    ///
    /// A live session under the same id is replaced: dropping its command
    /// sender unblocks the stale connection task, which then exits and finds
    /// its epoch no longer current. Exactly one session per id survives.
    pub async fn register(&self, id: &str, cmd_tx: mpsc::Sender<CommandFrame>) -> u64 {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let now = now_ms();
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(id) {
            Some(session) => {
                if session.cmd_tx.take().is_some() {
                    tracing::info!(agent = %id, "replacing live connection");
                }
                session.epoch = epoch;
                session.status = SessionStatus::Online;
                session.cmd_tx = Some(cmd_tx);
                session.last_seen = now;
            }
            None => {
                inner
                    .sessions
                    .insert(id.to_string(), AgentSession::new(epoch, cmd_tx, now));
            }
        }
        let cap = self.broadcast_capacity;
        let tx = inner
            .channels
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(cap).0);
        let _ = tx.send(ObserverEvent::Status(SessionStatus::Online));
        epoch
    }

    /// Flip the session offline and drop its command channel. Epoch-guarded
    /// and idempotent: returns whether this call performed the transition.
    /// The tombstone keeps last-known values for display.
    pub async fn unregister(&self, id: &str, epoch: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.sessions.get_mut(id) else {
            return false;
        };
        if session.epoch != epoch || session.status == SessionStatus::Offline {
            return false;
        }
        session.status = SessionStatus::Offline;
        session.cmd_tx = None;
        session.last_seen = now_ms();
        if let Some(tx) = inner.channels.get(id) {
            let _ = tx.send(ObserverEvent::Status(SessionStatus::Offline));
        }
        true
    }

    /// Overwrite the snapshot with frame `n` (replacing frame `n-1` wholesale),
    /// append to the rolling history window, and relay the raw frame to
    /// observers. No-op when `epoch` is stale.
    pub async fn update_snapshot(&self, id: &str, epoch: u64, frame: MetricFrame, raw: &str) {
        let frame = Arc::new(frame);
        let raw: Arc<str> = Arc::from(raw);
        let mut inner = self.inner.lock().await;
        {
            let Some(session) = inner.sessions.get_mut(id) else {
                return;
            };
            if session.epoch != epoch {
                return;
            }
            session.last_snapshot = Some(frame.clone());
            session.last_raw = Some(raw.clone());
            session.last_seen = now_ms();
            session.frames_received += 1;
            if session.history.len() >= self.history_capacity {
                session.history.pop_front();
            }
            session.history.push_back(frame);
        }
        self.frames_received_total.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = inner.channels.get(id) {
            let _ = tx.send(ObserverEvent::Frame(raw));
        }
    }

    /// Route one command to a connected agent, preserving submission order
    /// through the agent's single outbound channel. The send happens outside
    /// the registry lock; a timeout downgrades the session to offline.
    pub async fn send_command(&self, id: &str, cmd: CommandFrame) -> Result<(), HubError> {
        let (tx, epoch) = {
            let inner = self.inner.lock().await;
            let session = inner
                .sessions
                .get(id)
                .filter(|s| s.status == SessionStatus::Online)
                .ok_or_else(|| HubError::NotConnected(id.to_string()))?;
            let tx = session
                .cmd_tx
                .clone()
                .ok_or_else(|| HubError::NotConnected(id.to_string()))?;
            (tx, session.epoch)
        };
        match tokio::time::timeout(COMMAND_SEND_TIMEOUT, tx.send(cmd)).await {
            Ok(Ok(())) => Ok(()),
            // Receiver dropped between lookup and send: connection just died.
            Ok(Err(_)) => Err(HubError::NotConnected(id.to_string())),
            Err(_) => {
                if self.unregister(id, epoch).await {
                    tracing::warn!(agent = %id, "outbound channel stalled, marking agent offline");
                }
                Err(HubError::SendTimeout(id.to_string()))
            }
        }
    }

    /// Attach an observer to `id`. Returns the event stream plus the current
    /// state for the welcome message (last raw frame, if any, and status).
    pub async fn subscribe(
        &self,
        id: &str,
    ) -> (
        broadcast::Receiver<ObserverEvent>,
        Option<Arc<str>>,
        SessionStatus,
    ) {
        let mut inner = self.inner.lock().await;
        let (last_raw, status) = match inner.sessions.get(id) {
            Some(s) => (s.last_raw.clone(), s.status),
            None => (None, SessionStatus::Offline),
        };
        let cap = self.broadcast_capacity;
        let tx = inner
            .channels
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(cap).0);
        (tx.subscribe(), last_raw, status)
    }

    /// Sweep sessions whose last frame is older than `max_age` offline.
    /// Covers abrupt connection loss that never surfaces as a socket close.
    pub async fn expire_stale(&self, max_age: Duration) -> usize {
        let cutoff = now_ms().saturating_sub(max_age.as_millis() as u64);
        let stale: Vec<(String, u64)> = {
            let inner = self.inner.lock().await;
            inner
                .sessions
                .iter()
                .filter(|(_, s)| s.status == SessionStatus::Online && s.last_seen < cutoff)
                .map(|(id, s)| (id.clone(), s.epoch))
                .collect()
        };
        let mut expired = 0;
        for (id, epoch) in stale {
            if self.unregister(&id, epoch).await {
                tracing::warn!(agent = %id, "no frames within liveness window, marking offline");
                expired += 1;
            }
        }
        expired
    }

    /// Latest snapshot for `id` (pull model). `None` means never seen or no
    /// frame yet; callers report "agent offline", not an error.
    pub async fn snapshot(&self, id: &str) -> Option<Arc<MetricFrame>> {
        let inner = self.inner.lock().await;
        inner.sessions.get(id).and_then(|s| s.last_snapshot.clone())
    }

    /// Rolling snapshot window for `id`, oldest first.
    pub async fn history(&self, id: &str) -> Vec<Arc<MetricFrame>> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn summary(&self, id: &str) -> Option<AgentSummary> {
        let inner = self.inner.lock().await;
        inner.sessions.get(id).map(|s| summary_of(id, s))
    }

    pub async fn summaries(&self) -> Vec<AgentSummary> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<AgentSummary> = inner
            .sessions
            .iter()
            .map(|(id, s)| summary_of(id, s))
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock().await;
        let agents_online = inner
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Online)
            .count();
        RegistryStats {
            agents_online,
            agents_total: inner.sessions.len(),
            frames_received_total: self.frames_received_total.load(Ordering::Relaxed),
        }
    }
}

fn summary_of(id: &str, session: &AgentSession) -> AgentSummary {
    AgentSummary {
        id: id.to_string(),
        status: session.status,
        last_seen: session.last_seen,
        frames_received: session.frames_received,
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}
