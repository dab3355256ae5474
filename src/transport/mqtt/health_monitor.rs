//! Pure health monitoring and reconnection logic for the MQTT client

use super::connection::{ConnectionState, ReconnectConfig};
use tracing::{error, info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether the event loop should keep polling after a lost connection
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        let attempt = current_attempts + 1;
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: config.calculate_backoff_delay(attempt),
        }
    }

    /// Next connection state after an event
    ///
    /// A network error before the first ConnAck is terminal; after it, the
    /// connection is only considered lost.
    pub fn determine_next_state(
        current_state: &ConnectionState,
        event: ConnectionEvent,
    ) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(reason) => match current_state {
                ConnectionState::Connecting | ConnectionState::Failed(_) => {
                    ConnectionState::Failed(reason)
                }
                _ => ConnectionState::Disconnected(reason),
            },
            ConnectionEvent::Refused(reason) => ConnectionState::Failed(reason),
            ConnectionEvent::ReconnectionStarted(attempt) => {
                ConnectionState::Reconnecting(attempt)
            }
            ConnectionEvent::PermanentFailure(reason) => ConnectionState::Failed(reason),
        }
    }

    /// Publishing is refused before the first ConnAck and after a terminal
    /// failure. Otherwise rumqttc holds requests until the session is back.
    pub fn can_publish(state: &ConnectionState) -> bool {
        !matches!(state, ConnectionState::Connecting | ConnectionState::Failed(_))
    }

    /// Whether the event loop must stop instead of retrying
    pub fn is_terminal(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Failed(_))
    }

    /// Log connection state transition
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Reconnecting(_), ConnectionState::Connected) => {
                info!("MQTT reconnection successful");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!("MQTT connection lost: {}", reason);
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!("Starting MQTT reconnection attempt {}", attempt);
            }
            (_, ConnectionState::Failed(reason)) => {
                error!("MQTT connection failed: {}", reason);
            }
            _ => {}
        }
    }
}

/// Reconnection decision
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay_ms: u64 },
    AbortShutdownRequested,
    AbortMaxAttemptsExceeded,
}

/// Events that drive the connection state
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    ConnAckReceived,
    DisconnectedByBroker,
    NetworkError(String),
    Refused(String),
    ReconnectionStarted(u32),
    PermanentFailure(String),
}
