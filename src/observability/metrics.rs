//! Thread-safe metrics collection
//!
//! Atomic counters for both bridge directions and the MQTT connection. The
//! supervisor logs a snapshot on shutdown.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Serial → MQTT
    frames_received: AtomicU64,
    device_events: AtomicU64,
    ack_events: AtomicU64,
    unknown_frames: AtomicU64,
    decode_errors: AtomicU64,
    events_published: AtomicU64,
    publish_failures: AtomicU64,

    // MQTT → serial
    commands_queued: AtomicU64,
    commands_dropped: AtomicU64,
    commands_delivered: AtomicU64,
    encode_failures: AtomicU64,
    write_failures: AtomicU64,

    // Connection
    mqtt_connected: AtomicBool,
    connections_established: AtomicU64,
    connection_losses: AtomicU64,

    // Lifecycle
    bridge_state: Mutex<String>,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            device_events: AtomicU64::new(0),
            ack_events: AtomicU64::new(0),
            unknown_frames: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            commands_queued: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            commands_delivered: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connections_established: AtomicU64::new(0),
            connection_losses: AtomicU64::new(0),
            bridge_state: Mutex::new("init".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Inbound path
    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn device_event(&self) {
        self.device_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ack_event(&self) {
        self.ack_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_frame(&self) {
        self.unknown_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Outbound path
    pub fn command_queued(&self) {
        self.commands_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_delivered(&self) {
        self.commands_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encode_failed(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    // MQTT connection
    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        if self.mqtt_connected.swap(false, Ordering::Relaxed) {
            self.connection_losses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_bridge_state(&self, state: &str) {
        if let Ok(mut current) = self.bridge_state.lock() {
            *current = state.to_string();
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let current_state = self
            .bridge_state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            inbound: InboundMetrics {
                frames_received: self.frames_received.load(Ordering::Relaxed),
                device_events: self.device_events.load(Ordering::Relaxed),
                ack_events: self.ack_events.load(Ordering::Relaxed),
                unknown_frames: self.unknown_frames.load(Ordering::Relaxed),
                decode_errors: self.decode_errors.load(Ordering::Relaxed),
                events_published: self.events_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
            },
            outbound: OutboundMetrics {
                commands_queued: self.commands_queued.load(Ordering::Relaxed),
                commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
                commands_delivered: self.commands_delivered.load(Ordering::Relaxed),
                encode_failures: self.encode_failures.load(Ordering::Relaxed),
                write_failures: self.write_failures.load(Ordering::Relaxed),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_losses: self.connection_losses.load(Ordering::Relaxed),
            },
            current_state,
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub inbound: InboundMetrics,
    pub outbound: OutboundMetrics,
    pub mqtt: MqttMetrics,
    pub current_state: String,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct InboundMetrics {
    pub frames_received: u64,
    pub device_events: u64,
    pub ack_events: u64,
    pub unknown_frames: u64,
    pub decode_errors: u64,
    pub events_published: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct OutboundMetrics {
    pub commands_queued: u64,
    pub commands_dropped: u64,
    pub commands_delivered: u64,
    pub encode_failures: u64,
    pub write_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connections_established: u64,
    pub connection_losses: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let collector = MetricsCollector::new();
        collector.frame_received();
        collector.frame_received();
        collector.device_event();
        collector.decode_error();
        collector.command_queued();
        collector.command_delivered();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.inbound.frames_received, 2);
        assert_eq!(snapshot.inbound.device_events, 1);
        assert_eq!(snapshot.inbound.decode_errors, 1);
        assert_eq!(snapshot.outbound.commands_queued, 1);
        assert_eq!(snapshot.outbound.commands_delivered, 1);
    }

    #[test]
    fn test_connection_loss_counted_once() {
        let collector = MetricsCollector::new();
        collector.mqtt_connection_established();
        collector.mqtt_connection_lost();
        collector.mqtt_connection_lost();

        let snapshot = collector.get_metrics();
        assert!(!snapshot.mqtt.connected);
        assert_eq!(snapshot.mqtt.connections_established, 1);
        assert_eq!(snapshot.mqtt.connection_losses, 1);
    }

    #[test]
    fn test_bridge_state() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.get_metrics().current_state, "init");
        collector.set_bridge_state("running");
        assert_eq!(collector.get_metrics().current_state, "running");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MetricsCollector::new().get_metrics();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("frames_received"));
        assert!(json.contains("commands_delivered"));
    }
}
