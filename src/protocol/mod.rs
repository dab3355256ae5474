//! Ninja Cape serial protocol and its MQTT mapping
//!
//! This module implements the frame types, the codec that translates between
//! serial lines and MQTT messages, and the topic layout used on the broker.

pub mod codec;
pub mod messages;
pub mod topics;

pub use codec::{
    decode, encode, DecodeError, EncodeError, FrameTrailer, COMMAND_GROUP, COMMAND_VALUE,
    LEGACY_FRAME_TRAILER,
};
pub use messages::*;
pub use topics::*;
