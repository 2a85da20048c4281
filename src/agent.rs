// Agent connection loop: dial the hub, authenticate, stream metric frames,
// execute commands. Reconnection lives here, not in the hub.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::config::AgentConfig;
use crate::models::{CommandAction, CommandFrame};
use crate::sampler::MetricSampler;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the agent until the process is stopped. Every connection failure is
/// absorbed, logged, and retried after the configured delay.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    anyhow::ensure!(
        !config.secret.is_empty(),
        "agent.secret must be non-empty, set it in the [agent] config section"
    );
    let url = Url::parse(&config.hub_url)?;
    let sampler = MetricSampler::new();
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);

    loop {
        tracing::info!(url = %url, "connecting to hub");
        match run_connection(&url, &config, &sampler).await {
            Ok(()) => tracing::info!("hub closed the connection"),
            Err(e) => tracing::warn!(error = %e, "connection failed"),
        }
        tokio::time::sleep(reconnect_delay).await;
        tracing::info!("reconnecting");
    }
}

/// One connection lifetime: auth first, then interleave the sample tick with
/// inbound commands until the socket dies.
async fn run_connection(
    url: &Url,
    config: &AgentConfig,
    sampler: &MetricSampler,
) -> anyhow::Result<()> {
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let auth = serde_json::json!({ "secret": config.secret });
    sink.send(Message::Text(auth.to_string())).await?;
    tracing::info!("connected and authenticated");

    let mut tick = tokio::time::interval(Duration::from_secs(config.sample_interval_secs));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let frame = sampler.collect().await?;
                let json = serde_json::to_string(&frame)?;
                timeout(SEND_TIMEOUT, sink.send(Message::Text(json)))
                    .await
                    .map_err(|_| anyhow::anyhow!("metric send timed out"))??;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_command(sampler, &text).await,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}

async fn handle_command(sampler: &MetricSampler, text: &str) {
    match serde_json::from_str::<CommandFrame>(text) {
        Ok(CommandFrame {
            action: CommandAction::Kill,
            pid,
        }) => match sampler.kill_process(pid).await {
            Ok(true) => tracing::info!(pid, "process terminated"),
            Ok(false) => tracing::warn!(pid, "process not found or signal not delivered"),
            Err(e) => tracing::warn!(error = %e, pid, "kill failed"),
        },
        Err(e) => tracing::warn!(error = %e, "ignoring malformed command"),
    }
}
