//! MQTT transport for the bridge
//!
//! The module is split into focused sub-modules:
//!
//! - [`connection`] - broker options, connection state and reconnect backoff
//! - [`message_handler`] - pure routing of rumqttc events
//! - [`health_monitor`] - pure state transitions and reconnection decisions
//! - [`client`] - the event-loop task and the publishing handle
//!
//! # Usage
//!
//! ```rust,no_run
//! use ninjacape_bridge::bridge::OutboundQueue;
//! use ninjacape_bridge::config::{AuthSection, MqttSection};
//! use ninjacape_bridge::transport::mqtt::MqttClient;
//! use ninjacape_bridge::transport::Publisher;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     host: "localhost".to_string(),
//!     port: 1883,
//!     client_id: "ninjaCape".to_string(),
//!     keep_alive_secs: 60,
//!     connect_timeout_secs: 10,
//!     auth: AuthSection::default(),
//! };
//!
//! let queue = OutboundQueue::new();
//! let mut client = MqttClient::new(&config);
//! client.connect(queue.clone()).await?;
//! client.publisher().publish("ninjaCape/input/1007_0", b"FF0000".to_vec()).await?;
//! client.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::{MqttClient, MqttPublisher};
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageDisposition, MessageHandler};
