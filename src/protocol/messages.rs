//! Protocol message types for the Ninja Cape serial protocol
//!
//! Every frame on the serial line is one JSON object. Inbound frames carry
//! device state (`DEVICE`) or command acknowledgements (`ACK`); outbound frames
//! always use the `DEVICE` shape.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Top-level key of a device state frame
pub const DEVICE_KEY: &str = "DEVICE";
/// Top-level key of an acknowledgement frame
pub const ACK_KEY: &str = "ACK";

/// Field names inside a frame entry
pub const FIELD_DEVICE_ID: &str = "D";
pub const FIELD_GROUP_ID: &str = "G";
pub const FIELD_DATA: &str = "DA";

/// Device state reported by the cape
///
/// # Examples
/// ```
/// use ninjacape_bridge::protocol::DeviceEvent;
///
/// let event = DeviceEvent {
///     device_id: 1007,
///     group_id: "0".to_string(),
///     data: "FFFF00".to_string(),
/// };
/// assert_eq!(event.input_topic(), "ninjaCape/input/1007_0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Ninja device identifier (`D`)
    pub device_id: i64,
    /// Group/port identifier as carried on the wire (`G`)
    pub group_id: String,
    /// Device data string (`DA`)
    pub data: String,
}

impl DeviceEvent {
    /// MQTT topic this event is published on
    pub fn input_topic(&self) -> String {
        crate::protocol::topics::input_topic(self.device_id, &self.group_id)
    }
}

/// Acknowledgement of a previously sent command. Never republished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckEvent {
    pub device_id: i64,
    pub group_id: String,
    pub data: String,
}

/// JSON object with neither a `DEVICE` nor an `ACK` key
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownFrame {
    pub raw: Map<String, Value>,
}

impl fmt::Display for UnknownFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.raw.clone()))
    }
}

/// Result of decoding one serial line
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Device(DeviceEvent),
    Ack(AckEvent),
    Unknown(UnknownFrame),
}

/// Kind of frame a decode error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Device,
    Ack,
}

impl FrameKind {
    pub fn key(&self) -> &'static str {
        match self {
            FrameKind::Device => DEVICE_KEY,
            FrameKind::Ack => ACK_KEY,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// MQTT message waiting to be written to the serial device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundItem {
    /// Full MQTT topic, always under `ninjaCape/output/`
    pub topic: String,
    /// Raw MQTT payload
    pub payload: Bytes,
}

impl OutboundItem {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Wire shape of an outgoing command frame
#[derive(Debug, Serialize)]
pub(crate) struct CommandFrame<'a> {
    #[serde(rename = "DEVICE")]
    pub device: [CommandEntry<'a>; 1],
}

/// Field order matters: the cape firmware has only ever seen `G, V, D, DA`.
#[derive(Debug, Serialize)]
pub(crate) struct CommandEntry<'a> {
    #[serde(rename = "G")]
    pub group: &'a str,
    #[serde(rename = "V")]
    pub value: i64,
    #[serde(rename = "D")]
    pub device: i64,
    #[serde(rename = "DA")]
    pub data: &'a str,
}
