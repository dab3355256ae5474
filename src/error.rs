//! Top-level error type for the bridge
//!
//! Transport and configuration modules define their own error enums; this one
//! gathers them for the supervisor and the binary.

use crate::config::ConfigError;
use crate::platform::PlatformError;
use crate::transport::mqtt::MqttError;
use crate::transport::SerialError;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pin setup failed: {0}")]
    Platform(#[from] PlatformError),

    #[error("Serial port error: {0}")]
    Serial(#[from] SerialError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("Serial device closed the stream")]
    SerialClosed,

    #[error("Serial read failed: {source}")]
    SerialRead {
        #[source]
        source: SerialError,
    },

    #[error("{task} task failed: {message}")]
    TaskFailed { task: &'static str, message: String },
}

impl BridgeError {
    pub fn task_failed<S: Into<String>>(task: &'static str, message: S) -> Self {
        Self::TaskFailed {
            task,
            message: message.into(),
        }
    }

    /// Whether the inbound serial stream ended or failed after startup
    pub fn is_serial_loss(&self) -> bool {
        matches!(self, Self::SerialClosed | Self::SerialRead { .. })
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_error() {
        let err: BridgeError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_mqtt_error() {
        let err: BridgeError = MqttError::AlreadyStarted.into();
        assert!(matches!(err, BridgeError::Mqtt(_)));
    }

    #[test]
    fn test_serial_loss() {
        assert!(BridgeError::SerialClosed.is_serial_loss());
        assert!(BridgeError::SerialRead {
            source: SerialError::Closed
        }
        .is_serial_loss());
        assert!(!BridgeError::task_failed("inbound", "panicked").is_serial_loss());
    }

    #[test]
    fn test_task_failed_display() {
        let err = BridgeError::task_failed("inbound", "panicked");
        assert_eq!(err.to_string(), "inbound task failed: panicked");
    }
}
