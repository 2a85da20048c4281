// Local metric collection via sysinfo (agent side)

use std::sync::Arc;

use sysinfo::{Networks, Pid, ProcessesToUpdate, System, Users};

use crate::models::{MetricFrame, ProcessEntry, TOP_PROCESS_COUNT};

pub struct MetricSampler {
    sys: Arc<std::sync::Mutex<System>>,
    networks: Arc<std::sync::Mutex<Networks>>,
    users: Arc<std::sync::Mutex<Users>>,
}

impl Default for MetricSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSampler {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        // Establish the CPU baseline so the first collect has a real value.
        sys.refresh_all();
        let networks = Networks::new_with_refreshed_list();
        let users = Users::new_with_refreshed_list();
        Self {
            sys: Arc::new(std::sync::Mutex::new(sys)),
            networks: Arc::new(std::sync::Mutex::new(networks)),
            users: Arc::new(std::sync::Mutex::new(users)),
        }
    }

    /// Collect one full metric frame: CPU/RAM percentages, cumulative network
    /// megabytes, and the top processes by CPU.
    pub async fn collect(&self) -> anyhow::Result<MetricFrame> {
        let sys = self.sys.clone();
        let networks = self.networks.clone();
        let users = self.users.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_cpu_all();
            sys.refresh_memory();
            sys.refresh_processes(ProcessesToUpdate::All, true);

            let cpu = sys.global_cpu_usage() as f64;
            let cpu = if cpu.is_finite() {
                cpu.clamp(0.0, 100.0)
            } else {
                0.0
            };

            let mem_total = sys.total_memory();
            let mem_available = sys.available_memory();
            let mem_used = mem_total.saturating_sub(mem_available);
            let ram = if mem_total > 0 {
                (mem_used as f64 / mem_total as f64) * 100.0
            } else {
                0.0
            };

            let mut networks_guard = networks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
            networks_guard.refresh(true);
            let (rx_total, tx_total) = networks_guard.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (
                    rx.saturating_add(data.total_received()),
                    tx.saturating_add(data.total_transmitted()),
                )
            });

            let users_guard = users
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo users lock poisoned: {}", e))?;
            let n_cpus = sys.cpus().len().max(1) as f64;
            let mut processes: Vec<ProcessEntry> = sys
                .processes()
                .values()
                .map(|p| ProcessEntry {
                    pid: p.pid().as_u32(),
                    name: p.name().to_string_lossy().into_owned(),
                    user: p
                        .user_id()
                        .and_then(|uid| users_guard.get_user_by_id(uid))
                        .map(|u| u.name().to_string()),
                    cpu: round1(((p.cpu_usage() as f64) / n_cpus).min(100.0)),
                    ram: round1(if mem_total > 0 {
                        (p.memory() as f64 / mem_total as f64) * 100.0
                    } else {
                        0.0
                    }),
                })
                .collect();
            processes.sort_by(|a, b| {
                b.cpu
                    .partial_cmp(&a.cpu)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            processes.truncate(TOP_PROCESS_COUNT);

            let now = chrono::Local::now();
            Ok(MetricFrame {
                time: now.format("%H:%M:%S").to_string(),
                cpu: round1(cpu),
                ram: round1(ram),
                net_rx: round2(rx_total as f64 / 1024.0 / 1024.0),
                net_tx: round2(tx_total as f64 / 1024.0 / 1024.0),
                processes,
                // Screen capture is platform glue that lives outside this
                // agent; richer agents fill the field and the hub relays it.
                screenshot: None,
                timestamp: Some(now.to_rfc3339()),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// Terminate a process by pid. Returns false when the process is gone
    /// already or the signal could not be delivered.
    pub async fn kill_process(&self, pid: u32) -> anyhow::Result<bool> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            let pid = Pid::from_u32(pid);
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
            Ok(sys.process(pid).map(|p| p.kill()).unwrap_or(false))
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
