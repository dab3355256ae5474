//! NinjaCape MQTT bridge
//!
//! Connects a Ninja Blocks cape, which speaks newline-delimited JSON over a
//! UART, to an MQTT broker:
//!
//! - device state frames from the cape are published on
//!   `ninjaCape/input/<deviceId>_<groupId>`
//! - messages on `ninjaCape/output/<deviceId>` are queued and written to the
//!   cape one frame per tick
//!
//! # Quick Start
//!
//! ```rust
//! use ninjacape_bridge::protocol::{decode, encode, DecodedFrame, FrameTrailer};
//!
//! let frame = decode(r#"{"DEVICE":[{"G":"0","V":0,"D":1007,"DA":"FFFF00"}]}"#).unwrap();
//! if let DecodedFrame::Device(event) = frame {
//!     assert_eq!(event.input_topic(), "ninjaCape/input/1007_0");
//! }
//!
//! let command = encode("ninjaCape/output/1007", b"00FF00", FrameTrailer::Newline).unwrap();
//! assert!(command.ends_with('\n'));
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod platform;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use bridge::{OutboundQueue, Supervisor, SupervisorState};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
