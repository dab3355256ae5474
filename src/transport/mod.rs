//! Transport layer for the bridge
//!
//! This module provides the seams between the bridge engine and its two
//! peers: the serial device and the MQTT broker. The bridges only see these
//! traits, which lets the tests drive them with in-memory doubles.

pub mod mqtt;
pub mod serial;

pub use serial::SerialError;

/// Line-oriented reader over the serial device
#[async_trait::async_trait]
pub trait FrameReader: Send {
    /// Wait for the next newline-terminated line.
    ///
    /// Returns `Ok(None)` at end of stream. Blocks without a timeout.
    async fn read_line(&mut self) -> Result<Option<String>, SerialError>;
}

/// Frame writer over the serial device
#[async_trait::async_trait]
pub trait FrameWriter: Send {
    /// Write one encoded frame and flush it to the device
    async fn write_frame(&mut self, frame: &str) -> Result<(), SerialError>;

    /// Flush and release the device
    async fn close(&mut self) -> Result<(), SerialError>;
}

/// Publishing side of the MQTT broker connection
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish a payload on a topic, fire-and-forget
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error>;
}

/// Broker session owned by the supervisor for shutdown
#[async_trait::async_trait]
pub trait BrokerSession: Send {
    /// Leave the broker and stop the session's background work
    async fn disconnect(&mut self) -> Result<(), mqtt::MqttError>;

    /// Resolve once the session has failed for good and will not reconnect
    async fn wait_for_failure(&mut self) -> mqtt::MqttError;
}

#[async_trait::async_trait]
impl<T: FrameReader + ?Sized> FrameReader for Box<T> {
    async fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        (**self).read_line().await
    }
}

#[async_trait::async_trait]
impl<T: FrameWriter + ?Sized> FrameWriter for Box<T> {
    async fn write_frame(&mut self, frame: &str) -> Result<(), SerialError> {
        (**self).write_frame(frame).await
    }

    async fn close(&mut self) -> Result<(), SerialError> {
        (**self).close().await
    }
}
