//! The bridge engine
//!
//! - [`inbound`] - serial lines to MQTT publishes
//! - [`outbound`] - queued MQTT commands to serial frames, one per tick
//! - [`queue`] - the FIFO shared by the MQTT event loop and the outbound bridge
//! - [`supervisor`] - startup, the running phase and shutdown

pub mod inbound;
pub mod outbound;
pub mod queue;
pub mod supervisor;

pub use inbound::{InboundBridge, LineOutcome};
pub use outbound::{OutboundBridge, TickOutcome};
pub use queue::OutboundQueue;
pub use supervisor::{Supervisor, SupervisorState};
