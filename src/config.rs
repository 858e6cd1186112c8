//! Configuration management for Selene
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{Result, SeleneError};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// MQTT broker connection configuration
    pub mqtt: MqttConfig,

    /// Device instance for D-Bus service naming
    pub device_instance: u32,

    /// Product name shown on the Venus OS UI
    pub device_name: String,

    /// Staleness watchdog window in seconds (0 disables the watchdog)
    pub timeout_seconds: u64,

    /// Static wallbox properties
    pub wallbox: WallboxConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// MQTT broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address
    pub broker_address: String,

    /// TCP port (typically 1883, or 8883 for TLS)
    pub broker_port: u16,

    /// Username (empty = anonymous)
    #[serde(default)]
    pub username: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// Enable TLS on the broker connection
    #[serde(default)]
    pub tls_enabled: bool,

    /// Path to a custom CA bundle (PEM); required when TLS is enabled
    #[serde(default)]
    pub tls_ca_path: String,

    /// Subscription topic filter, e.g. "openWB/lp/1/#"
    pub topic: String,
}

/// Static wallbox properties published once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallboxConfig {
    /// Maximum charging current in amperes
    pub max_current: f64,

    /// Charger position (0 = AC output, 1 = AC input)
    pub position: u8,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (DEBUG, INFO, WARNING, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Whether to use JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_address: "192.168.1.50".to_string(),
            broker_port: 1883,
            username: String::new(),
            password: String::new(),
            tls_enabled: false,
            tls_ca_path: String::new(),
            topic: "openWB/lp/1/#".to_string(),
        }
    }
}

impl Default for WallboxConfig {
    fn default() -> Self {
        Self {
            max_current: 16.0,
            position: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/selene.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            device_instance: 40,
            device_name: "openWB wallbox".to_string(),
            timeout_seconds: 60,
            wallbox: WallboxConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "selene_config.yaml",
            "/data/selene_config.yaml",
            "/etc/selene/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker_address.is_empty() {
            return Err(SeleneError::validation(
                "mqtt.broker_address",
                "Broker address cannot be empty",
            ));
        }

        if self.mqtt.broker_port == 0 {
            return Err(SeleneError::validation(
                "mqtt.broker_port",
                "Port must be greater than 0",
            ));
        }

        if self.mqtt.topic.is_empty() {
            return Err(SeleneError::validation(
                "mqtt.topic",
                "Subscription topic cannot be empty",
            ));
        }

        if self.mqtt.tls_enabled && self.mqtt.tls_ca_path.is_empty() {
            return Err(SeleneError::validation(
                "mqtt.tls_ca_path",
                "CA bundle path is required when TLS is enabled",
            ));
        }

        if self.wallbox.max_current <= 0.0 {
            return Err(SeleneError::validation(
                "wallbox.max_current",
                "Must be positive",
            ));
        }

        if self.wallbox.position > 1 {
            return Err(SeleneError::validation(
                "wallbox.position",
                "Must be 0 (AC output) or 1 (AC input)",
            ));
        }

        Ok(())
    }

    /// D-Bus service name for this device instance
    pub fn service_name(&self) -> String {
        format!("com.victronenergy.evcharger.mqtt_wb_{}", self.device_instance)
    }

    /// MQTT client identifier for this device instance
    pub fn client_id(&self) -> String {
        format!("mqtt_wb_{}", self.device_instance)
    }
}
