//! Pure connection state management for the MQTT client
//!
//! Broker options from configuration, the connection state published by the
//! event-loop task, and the reconnect backoff schedule.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use std::time::Duration;
use thiserror::Error;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - waiting for the first ConnAck
    Connecting,
    /// Broker acknowledged the session
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Connection lost after a successful connect (attempt count)
    Reconnecting(u32),
    /// Never connected; the event loop has given up
    Failed(String),
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given attempt (1-based)
    /// Pattern: 25ms, 50ms, 100ms, 250ms, then sustain at 250ms forever
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("No ConnAck from broker within {0:?}")]
    ConnAckTimeout(Duration),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Event loop already started")]
    AlreadyStarted,
}

/// Build broker options from the MQTT section of the configuration
pub fn configure_mqtt_options(config: &MqttSection) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
    mqtt_options.set_keep_alive(config.keep_alive());

    if let Some((user, pass)) = config.credentials() {
        mqtt_options.set_credentials(user, pass);
    }

    mqtt_options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthSection;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "ninjaCape".to_string(),
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            auth: AuthSection::default(),
        }
    }

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.backoff_pattern, vec![25, 50, 100, 250]);
        assert_eq!(config.sustained_delay, 250);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), 25);
        assert_eq!(config.calculate_backoff_delay(2), 50);
        assert_eq!(config.calculate_backoff_delay(3), 100);
        assert_eq!(config.calculate_backoff_delay(4), 250);

        assert_eq!(config.calculate_backoff_delay(5), 250);
        assert_eq!(config.calculate_backoff_delay(100), 250);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            max_attempts: None,
            backoff_pattern: vec![],
            sustained_delay: 1000,
        };
        assert_eq!(config.calculate_backoff_delay(1), 1000);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_mqtt_config());
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.client_id(), "ninjaCape");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_configure_mqtt_options_with_auth() {
        let mut config = test_mqtt_config();
        config.auth = AuthSection {
            enabled: true,
            user: Some("ninja".to_string()),
            pass: Some("secret".to_string()),
        };

        let options = configure_mqtt_options(&config);
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
        assert_eq!(ConnectionState::Reconnecting(2), ConnectionState::Reconnecting(2));
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::ConnAckTimeout(Duration::from_secs(10)),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::NotConnected {
                state: ConnectionState::Connecting,
            },
            MqttError::AlreadyStarted,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
