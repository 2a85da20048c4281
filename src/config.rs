use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub hub: HubConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Shared secret every agent must present in its first frame.
    pub agent_secret: String,
    /// Rolling window of snapshots kept per agent for charting.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Max events buffered per observer stream (slow observers lag and drop).
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Max commands queued towards one agent connection.
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,
    /// A session with no frame for this long is swept offline.
    #[serde(default = "default_offline_after_secs")]
    pub offline_after_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// How often to log app stats (connected agents, frames relayed) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Hub endpoint including this agent's identifier path segment.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    /// Secret presented to the hub on connect.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            secret: String::new(),
            sample_interval_secs: default_sample_interval_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

fn default_history_capacity() -> usize {
    20
}

fn default_broadcast_capacity() -> usize {
    32
}

fn default_command_channel_capacity() -> usize {
    16
}

fn default_offline_after_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

fn default_hub_url() -> String {
    "ws://127.0.0.1:8080/ws/agent/local".into()
}

fn default_sample_interval_secs() -> u64 {
    3
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.hub.agent_secret.is_empty(),
            "hub.agent_secret must be non-empty"
        );
        anyhow::ensure!(
            self.hub.history_capacity > 0,
            "hub.history_capacity must be > 0, got {}",
            self.hub.history_capacity
        );
        anyhow::ensure!(
            self.hub.broadcast_capacity > 0,
            "hub.broadcast_capacity must be > 0, got {}",
            self.hub.broadcast_capacity
        );
        anyhow::ensure!(
            self.hub.command_channel_capacity > 0,
            "hub.command_channel_capacity must be > 0, got {}",
            self.hub.command_channel_capacity
        );
        anyhow::ensure!(
            self.hub.offline_after_secs > 0,
            "hub.offline_after_secs must be > 0, got {}",
            self.hub.offline_after_secs
        );
        anyhow::ensure!(
            self.hub.sweep_interval_secs > 0,
            "hub.sweep_interval_secs must be > 0, got {}",
            self.hub.sweep_interval_secs
        );
        anyhow::ensure!(
            self.hub.stats_log_interval_secs > 0,
            "hub.stats_log_interval_secs must be > 0, got {}",
            self.hub.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.agent.hub_url.is_empty(),
            "agent.hub_url must be non-empty"
        );
        anyhow::ensure!(
            self.agent.sample_interval_secs > 0,
            "agent.sample_interval_secs must be > 0, got {}",
            self.agent.sample_interval_secs
        );
        anyhow::ensure!(
            self.agent.reconnect_delay_secs > 0,
            "agent.reconnect_delay_secs must be > 0, got {}",
            self.agent.reconnect_delay_secs
        );
        Ok(())
    }
}
