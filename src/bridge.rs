//! Core bridge orchestration
//!
//! This module runs the property-store side of the bridge: it applies the
//! router's property updates to the D-Bus tree, drives the staleness
//! watchdog and the liveness counter on a fixed tick, and feeds supervisor
//! property writes through the back-channel.

use crate::backchannel::{CommandPublisher, commands_for_write};
use crate::config::Config;
use crate::dbus::DbusService;
use crate::error::{Result, SeleneError};
use crate::logging::get_logger;
use crate::router::PropertyUpdate;
use crate::state::LinkShared;
use chrono::Utc;
use rumqttc::AsyncClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};

/// Watchdog/heartbeat tick period
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Events accepted by the bridge loop from the property store
#[derive(Debug, Clone)]
pub enum BridgeCommand {
    /// A supervisor wrote a value to the D-Bus tree
    PropertyWritten {
        path: String,
        value: serde_json::Value,
    },
}

/// Advance the published liveness index, wrapping 255 back to 0
pub fn next_update_index(index: u8) -> u8 {
    index.wrapping_add(1)
}

/// Whether the staleness window has elapsed; a zero timeout disables the
/// watchdog entirely
pub fn staleness_exceeded(now_unix: i64, last_unix: i64, timeout_seconds: u64) -> bool {
    timeout_seconds != 0 && now_unix - last_unix > timeout_seconds as i64
}

/// Main bridge loop for Selene
pub struct WallboxBridge {
    /// Configuration
    config: Config,

    /// Logger with context
    logger: crate::logging::StructuredLogger,

    /// D-Bus property tree
    dbus: DbusService,

    /// Cross-domain snapshot written by the MQTT task
    shared: Arc<LinkShared>,

    /// Property updates produced by the topic router
    events_rx: mpsc::UnboundedReceiver<Vec<PropertyUpdate>>,

    /// Supervisor write notifications from the D-Bus items
    commands_rx: mpsc::UnboundedReceiver<BridgeCommand>,

    /// Fire-and-forget outbound command publisher
    publisher: CommandPublisher,

    /// Published liveness index
    update_index: u8,
}

impl WallboxBridge {
    /// Create a new bridge instance
    pub async fn new(
        config: Config,
        shared: Arc<LinkShared>,
        events_rx: mpsc::UnboundedReceiver<Vec<PropertyUpdate>>,
        commands_rx: mpsc::UnboundedReceiver<BridgeCommand>,
        commands_tx: mpsc::UnboundedSender<BridgeCommand>,
        mqtt_client: AsyncClient,
    ) -> Result<Self> {
        let logger = get_logger("bridge");
        logger.info("Initializing wallbox bridge");

        let dbus = DbusService::new(config.service_name(), commands_tx).await?;

        Ok(Self {
            config,
            logger,
            dbus,
            shared,
            events_rx,
            commands_rx,
            publisher: CommandPublisher::new(mqtt_client),
            update_index: 0,
        })
    }

    /// Run the bridge main loop
    ///
    /// Returns only on a fatal condition; a staleness timeout is the single
    /// planned exit path, surfaced as a `Timeout` error for the caller to
    /// terminate on.
    pub async fn run(&mut self) -> Result<()> {
        self.dbus.start().await?;
        self.register_paths().await?;

        self.logger.info("Starting bridge main loop");

        let mut heartbeat = interval(HEARTBEAT_PERIOD);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    self.heartbeat_tick().await?;
                }
                Some(updates) = self.events_rx.recv() => {
                    if let Err(e) = self.dbus.update_paths(updates).await {
                        self.logger.error(&format!("Failed to publish updates: {}", e));
                    }
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd);
                }
            }
        }
    }

    /// Register the VeDbus path tree with initial values
    async fn register_paths(&mut self) -> Result<()> {
        let conn_str = format!(
            "MQTT at {}:{}",
            self.config.mqtt.broker_address, self.config.mqtt.broker_port
        );

        // Management objects, as specified in the ccgx dbus-api document
        let management: [(&str, serde_json::Value); 11] = [
            ("/Mgmt/ProcessName", serde_json::json!("selene")),
            (
                "/Mgmt/ProcessVersion",
                serde_json::json!(env!("APP_VERSION")),
            ),
            ("/Mgmt/Connection", serde_json::json!(conn_str)),
            (
                "/DeviceInstance",
                serde_json::json!(self.config.device_instance),
            ),
            ("/ProductId", serde_json::json!(0xFFFFu32)),
            ("/ProductName", serde_json::json!(self.config.device_name)),
            ("/CustomName", serde_json::json!(self.config.device_name)),
            ("/FirmwareVersion", serde_json::json!("0.9")),
            ("/HardwareVersion", serde_json::json!(2)),
            ("/Connected", serde_json::json!(1)),
            ("/UpdateIndex", serde_json::json!(0u8)),
        ];
        for (path, initial) in management {
            self.dbus.ensure_item(path, initial, false).await?;
        }

        // Combined status has no unit and no sensible initial value
        self.dbus
            .ensure_item("/Status", serde_json::Value::Null, false)
            .await?;

        // Telemetry and control paths, all writable towards the supervisor
        let values: [(&str, serde_json::Value); 13] = [
            ("/Ac/Power", serde_json::json!(0)),
            ("/Ac/L1/Power", serde_json::json!(0)),
            ("/Ac/L2/Power", serde_json::json!(0)),
            ("/Ac/L3/Power", serde_json::json!(0)),
            ("/Ac/Energy/Forward", serde_json::json!(0)),
            ("/ChargingTime", serde_json::json!(0)),
            ("/Ac/Voltage", serde_json::json!(0)),
            ("/Current", serde_json::json!(0)),
            ("/SetCurrent", serde_json::json!(0)),
            (
                "/MaxCurrent",
                serde_json::json!(self.config.wallbox.max_current),
            ),
            ("/Mode", serde_json::json!(0)),
            (
                "/Position",
                serde_json::json!(self.config.wallbox.position),
            ),
            ("/StartStop", serde_json::json!(0)),
        ];
        for (path, initial) in values {
            self.dbus.ensure_item(path, initial, true).await?;
        }

        Ok(())
    }

    /// One watchdog/heartbeat tick
    async fn heartbeat_tick(&mut self) -> Result<()> {
        let now = Utc::now().timestamp();
        let timeout = self.config.timeout_seconds;
        if staleness_exceeded(now, self.shared.last_message(), timeout) {
            let msg = format!(
                "Bridge stopped. Timeout of {} seconds exceeded, since no new MQTT message was received in this time.",
                timeout
            );
            self.logger.error(&msg);
            return Err(SeleneError::timeout(msg));
        }

        // Bump the liveness index to show that new data is available
        self.update_index = next_update_index(self.update_index);
        if let Err(e) = self
            .dbus
            .update_path("/UpdateIndex", serde_json::json!(self.update_index))
            .await
        {
            self.logger
                .error(&format!("Failed to publish update index: {}", e));
        }
        Ok(())
    }

    /// Translate an accepted supervisor write into outbound commands
    fn handle_command(&self, cmd: BridgeCommand) {
        match cmd {
            BridgeCommand::PropertyWritten { path, value } => {
                self.logger
                    .debug(&format!("Property written: {} = {}", path, value));
                let mode = self.shared.get_charge_mode();
                for command in commands_for_write(&path, &value, mode) {
                    self.publisher.publish(&command);
                }
            }
        }
    }
}
