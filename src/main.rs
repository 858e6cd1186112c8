use anyhow::Result;
use selene::bridge::{BridgeCommand, WallboxBridge};
use selene::config::Config;
use selene::mqtt::MqttLink;
use selene::router::PropertyUpdate;
use selene::state::LinkShared;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    selene::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Selene openWB bridge starting up");

    let shared = Arc::new(LinkShared::new(chrono::Utc::now()));
    let (events_tx, events_rx) = mpsc::unbounded_channel::<Vec<PropertyUpdate>>();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel::<BridgeCommand>();

    let (link, client) = MqttLink::new(&config, Arc::clone(&shared), events_tx)
        .map_err(|e| anyhow::anyhow!("Failed to create MQTT link: {}", e))?;

    let mut bridge = WallboxBridge::new(
        config,
        Arc::clone(&shared),
        events_rx,
        commands_rx,
        commands_tx,
        client,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create bridge: {}", e))?;

    // The MQTT event loop runs on its own task; the bridge loop owns this one
    let link_task = tokio::spawn(link.run());

    match bridge.run().await {
        Ok(_) => {
            info!("Bridge shutdown complete");
            link_task.abort();
            Ok(())
        }
        Err(e) => {
            error!("Bridge stopped: {}", e);
            link_task.abort();
            Err(anyhow::anyhow!("Bridge error: {}", e))
        }
    }
}
