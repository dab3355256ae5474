//! Configuration system for the bridge
//!
//! The file is TOML by default. A file ending in `.json` is read as JSON, which
//! keeps the `config.json` layout deployed with earlier bridges working:
//!
//! ```json
//! {
//!   "mqtt": {"host": "hassio", "port": 1883,
//!            "auth": {"enabled": false, "user": "", "pass": ""}},
//!   "serial": {"path": "/dev/ttyO1", "uart_pins": ["P9.26", "P9.24"]}
//! }
//! ```

use crate::protocol::FrameTrailer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub mqtt: MqttSection,
    pub serial: SerialSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub protocol: ProtocolSection,
}

/// MQTT broker connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker host name or address
    pub host: String,
    /// Broker port (default: 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long to wait for the broker's ConnAck at startup (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub auth: AuthSection,
}

/// Username/password authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthSection {
    #[serde(default)]
    pub enabled: bool,
    /// Required when `enabled`
    #[serde(default)]
    pub user: Option<String>,
    /// Required when `enabled`
    #[serde(default)]
    pub pass: Option<String>,
}

/// Serial device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSection {
    /// Device path, e.g. `/dev/ttyO1` on a BeagleBone or `/dev/ttyAMA0` on a Pi
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Pins to switch to UART mode before opening the port
    #[serde(default)]
    pub uart_pins: Vec<String>,
    /// Use a dry-run serial double instead of a real port
    #[serde(default)]
    pub dummy: bool,
}

/// Bridge engine tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Outbound delivery cadence in milliseconds (default: 500)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Maximum queued commands, 0 for unbounded (default: 0)
    #[serde(default)]
    pub queue_capacity: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            queue_capacity: 0,
        }
    }
}

/// Wire protocol options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProtocolSection {
    /// What follows each outgoing frame (default: legacy)
    #[serde(default)]
    pub frame_trailer: FrameTrailer,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "ninjaCape".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_baud_rate() -> u32 {
    crate::transport::serial::DEFAULT_BAUD_RATE
}

fn default_tick_interval() -> u64 {
    500
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("MQTT authentication is enabled but '{0}' is not set")]
    MissingCredential(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load and validate configuration, picking the format from the file extension
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.host must not be empty".to_string(),
            ));
        }
        if self.mqtt.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.port must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.client_id must not be empty".to_string(),
            ));
        }

        if self.mqtt.auth.enabled {
            let user = self.mqtt.auth.user.as_deref().unwrap_or_default();
            if user.is_empty() {
                return Err(ConfigError::MissingCredential("mqtt.auth.user"));
            }
            if self.mqtt.auth.pass.is_none() {
                return Err(ConfigError::MissingCredential("mqtt.auth.pass"));
            }
        }

        if !self.serial.dummy && self.serial.path.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "serial.path must be set unless serial.dummy is enabled".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::InvalidConfig(
                "serial.baud_rate must be greater than 0".to_string(),
            ));
        }

        if self.bridge.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "bridge.tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML with the MQTT password masked
    pub fn to_masked_toml(&self) -> Result<String, ConfigError> {
        let mut masked = self.clone();
        if masked.mqtt.auth.pass.is_some() {
            masked.mqtt.auth.pass = Some("********".to_string());
        }
        Ok(toml::to_string_pretty(&masked)?)
    }
}

impl MqttSection {
    /// Username and password, only when authentication is enabled
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if !self.auth.enabled {
            return None;
        }
        match (&self.auth.user, &self.auth.pass) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl BridgeSection {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
