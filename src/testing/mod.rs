//! Testing utilities and mock implementations
//!
//! Doubles for the serial device and the MQTT broker so the bridge can be
//! exercised without hardware or a running broker.

pub mod mocks;

pub use mocks::*;
