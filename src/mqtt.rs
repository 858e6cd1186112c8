//! MQTT connection lifecycle management
//!
//! This module owns the broker connection: initial connect, subscription on
//! ConnAck, message delivery into the topic router, and reconnection with a
//! fixed delay after transport errors. No other component touches the
//! connection handle directly.

use crate::config::Config;
use crate::error::{Result, SeleneError};
use crate::logging::get_logger;
use crate::router::{GLOBAL_CHARGE_MODE_TOPIC, PropertyUpdate, Router};
use crate::state::LinkShared;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS, TlsConfiguration, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Delay between reconnection attempts after a transport error
pub const RECONNECT_DELAY: Duration = Duration::from_secs(15);

/// Keep-alive interval on the broker connection
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Connection state of the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection; waiting for the next attempt
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected and subscribed
    Connected,
}

impl LinkState {
    /// Transition on a broker ConnAck
    pub fn on_connack(self) -> Self {
        LinkState::Connected
    }

    /// Transition on a transport error or broker disconnect
    pub fn on_error(self) -> Self {
        LinkState::Disconnected
    }

    /// Transition when a new connection attempt starts
    pub fn on_retry(self) -> Self {
        LinkState::Connecting
    }
}

/// Owns the broker connection and drives inbound message delivery
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    router: Router,
    events_tx: mpsc::UnboundedSender<Vec<PropertyUpdate>>,
    subscribe_topic: String,
    state: LinkState,
    logger: crate::logging::StructuredLogger,
}

impl MqttLink {
    /// Build the broker link; returns the link and a clonable client handle
    /// for the outbound command publisher
    pub fn new(
        config: &Config,
        shared: Arc<LinkShared>,
        events_tx: mpsc::UnboundedSender<Vec<PropertyUpdate>>,
    ) -> Result<(Self, AsyncClient)> {
        let logger = get_logger("mqtt");

        let mut options = MqttOptions::new(
            config.client_id(),
            &config.mqtt.broker_address,
            config.mqtt.broker_port,
        );
        options.set_keep_alive(KEEP_ALIVE);

        if !config.mqtt.username.is_empty() && !config.mqtt.password.is_empty() {
            logger.info(&format!(
                "Using username \"{}\" and password to connect",
                config.mqtt.username
            ));
            options.set_credentials(&config.mqtt.username, &config.mqtt.password);
        }

        if config.mqtt.tls_enabled {
            logger.info(&format!(
                "TLS is enabled, CA bundle \"{}\"",
                config.mqtt.tls_ca_path
            ));
            let ca = std::fs::read(&config.mqtt.tls_ca_path).map_err(|e| {
                SeleneError::config(format!(
                    "Failed to read CA bundle {}: {}",
                    config.mqtt.tls_ca_path, e
                ))
            })?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        let (client, eventloop) = AsyncClient::new(options, 64);
        let router = Router::new(&config.mqtt.topic, shared);

        let link = Self {
            client: client.clone(),
            eventloop,
            router,
            events_tx,
            subscribe_topic: config.mqtt.topic.clone(),
            state: LinkState::Disconnected,
            logger,
        };
        Ok((link, client))
    }

    /// Drive the connection forever
    ///
    /// Transport errors are recovered by sleeping `RECONNECT_DELAY` and
    /// polling again; there is no retry limit. Staleness is not handled
    /// here - the bridge watchdog owns that policy.
    pub async fn run(mut self) {
        self.state = self.state.on_retry();
        self.logger
            .info(&format!("Connecting to MQTT broker, subscription {}", self.subscribe_topic));

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.on_connack().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.on_publish(&publish);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.logger.warn("Broker requested disconnect");
                    self.state = self.state.on_error();
                }
                Ok(_) => {}
                Err(e) => {
                    if self.state == LinkState::Connected {
                        self.logger.warn("Got disconnected, will auto-reconnect");
                    }
                    self.state = self.state.on_error();
                    self.logger.error(&format!(
                        "Connection error: {}. Retrying in {} seconds",
                        e,
                        RECONNECT_DELAY.as_secs()
                    ));
                    sleep(RECONNECT_DELAY).await;
                    self.state = self.state.on_retry();
                }
            }
        }
    }

    async fn on_connack(&mut self) {
        self.state = self.state.on_connack();
        self.logger.info("Connected to MQTT broker");
        for topic in [self.subscribe_topic.as_str(), GLOBAL_CHARGE_MODE_TOPIC] {
            if let Err(e) = self.client.subscribe(topic, QoS::AtMostOnce).await {
                self.logger
                    .error(&format!("Subscribe to {} failed: {}", topic, e));
            }
        }
    }

    fn on_publish(&mut self, publish: &Publish) {
        match self.router.route(&publish.topic, &publish.payload) {
            Ok(updates) => {
                if !updates.is_empty() {
                    let _ = self.events_tx.send(updates);
                }
            }
            Err(e) => {
                self.logger.error(&format!(
                    "Failed to handle message on topic '{}' (payload \"{}\"): {}",
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload),
                    e
                ));
            }
        }
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        self.state
    }
}
