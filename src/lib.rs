//! # Selene - openWB wallbox MQTT bridge for Victron Venus OS
//!
//! Selene subscribes to the MQTT telemetry of an openWB wallbox and
//! publishes it as a standard Victron EV charger service on D-Bus, so the
//! Venus OS energy-management stack can monitor and control the charger.
//! Supervisor writes to the D-Bus tree are translated back into openWB
//! command messages.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of
//! concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `state`: Wallbox state and derived-value computations
//! - `router`: Inbound topic dispatch into property updates
//! - `mqtt`: Broker connection lifecycle and reconnection
//! - `dbus`: D-Bus integration for Venus OS
//! - `backchannel`: Property writes to outbound command messages
//! - `bridge`: Main loop, staleness watchdog, and liveness counter

pub mod backchannel;
pub mod bridge;
pub mod config;
pub mod dbus;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod router;
pub mod state;

// Re-export commonly used types
pub use bridge::WallboxBridge;
pub use config::Config;
pub use error::{Result, SeleneError};
