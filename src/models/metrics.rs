// Metric frame as reported by agents. Field names are the wire format;
// do not rename without versioning the protocol.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub cpu: f64,
    pub ram: f64,
}

/// One full metric report. Replaces the previous snapshot wholesale;
/// the hub never merges fields across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFrame {
    /// Wall-clock "HH:MM:SS" on the agent, used as a chart label.
    #[serde(default)]
    pub time: String,
    pub cpu: f64,
    pub ram: f64,
    /// Cumulative received/transmitted megabytes since agent boot.
    #[serde(default)]
    pub net_rx: f64,
    #[serde(default)]
    pub net_tx: f64,
    /// Top processes by CPU, descending, at most [`TOP_PROCESS_COUNT`].
    #[serde(default)]
    pub processes: Vec<ProcessEntry>,
    /// Opaque encoded image blob (data URL); the hub relays it untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// ISO-8601 timestamp on the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Process list cutoff applied by agents.
pub const TOP_PROCESS_COUNT: usize = 20;

impl MetricFrame {
    /// Range check for the required numeric fields. Parsing already
    /// guarantees presence; this rejects nonsense percentages.
    pub fn check_ranges(&self) -> Result<(), String> {
        for (field, value) in [("cpu", self.cpu), ("ram", self.ram)] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(format!("{field} must be within 0..=100, got {value}"));
            }
        }
        for (field, value) in [("net_rx", self.net_rx), ("net_tx", self.net_tx)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{field} must be a non-negative number, got {value}"));
            }
        }
        Ok(())
    }
}
