// Background hub maintenance: liveness sweep + periodic app-stats log.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::hub::SessionRegistry;

/// Registry handle and shutdown for the worker.
pub struct WorkerDeps {
    pub registry: Arc<SessionRegistry>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Worker timing config. Sweep and stats logging run on independent
/// real-time intervals.
pub struct WorkerConfig {
    pub sweep_interval_secs: u64,
    /// A session with no frame for this long is swept offline.
    pub offline_after_secs: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        registry,
        mut shutdown_rx,
    } = deps;
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let offline_after = Duration::from_secs(config.offline_after_secs);
    let stats_log_interval = Duration::from_secs(config.stats_log_interval_secs);

    tokio::spawn(async move {
        let mut sweep_tick = interval(sweep_interval);
        sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(stats_log_interval);
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sweep_tick.tick() => {
                    let expired = registry.expire_stale(offline_after).await;
                    if expired > 0 {
                        tracing::debug!(operation = "expire_stale", expired, "liveness sweep");
                    }
                }
                _ = stats_log_tick.tick() => {
                    let stats = registry.stats().await;
                    tracing::info!(
                        agents_online = stats.agents_online,
                        agents_total = stats.agents_total,
                        frames_received_total = stats.frames_received_total,
                        "app stats"
                    );
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
            }
        }
    })
}
