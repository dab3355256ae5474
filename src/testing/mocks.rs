//! Mock implementations for testing
//!
//! In-memory stand-ins for the serial device and the broker so both bridge
//! directions and the supervisor can run without hardware or a network.

use crate::config::{
    AuthSection, BridgeConfig, BridgeSection, MqttSection, ProtocolSection, SerialSection,
};
use crate::transport::mqtt::MqttError;
use crate::transport::{BrokerSession, FrameReader, FrameWriter, Publisher, SerialError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{mpsc, Mutex, Notify};

pub type PublishedMessage = (String, Vec<u8>);

/// Configuration using the dummy serial port and a local broker
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        mqtt: MqttSection {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "ninjaCape-test".to_string(),
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            auth: AuthSection::default(),
        },
        serial: SerialSection {
            path: String::new(),
            baud_rate: 9600,
            uart_pins: Vec::new(),
            dummy: true,
        },
        bridge: BridgeSection::default(),
        protocol: ProtocolSection::default(),
    }
}

/// Mock publisher recording every publish
#[derive(Debug, Clone, Default)]
pub struct MockPublisher {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail: bool,
    notify: Arc<Notify>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    /// Wait until at least `count` messages have been published
    pub async fn wait_for_published(&self, count: usize) -> Vec<PublishedMessage> {
        loop {
            let notified = self.notify.notified();
            let messages = self.published().await;
            if messages.len() >= count {
                return messages;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    type Error = MqttError;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }

        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Serial reader fed through a channel
///
/// Dropping the sender ends the stream, like unplugging the cape.
pub struct MockSerialReader {
    lines: mpsc::UnboundedReceiver<Result<String, SerialError>>,
}

impl MockSerialReader {
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<String, SerialError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { lines: rx }, tx)
    }
}

#[async_trait]
impl FrameReader for MockSerialReader {
    async fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        match self.lines.recv().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Serial writer recording every frame; clones share the record
#[derive(Debug, Clone, Default)]
pub struct MockSerialWriter {
    frames: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    should_fail: bool,
    notify: Arc<Notify>,
}

impl MockSerialWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn frames(&self) -> Vec<String> {
        self.lock_frames().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames have been written
    pub async fn wait_for_frames(&self, count: usize) -> Vec<String> {
        loop {
            let notified = self.notify.notified();
            let frames = self.frames();
            if frames.len() >= count {
                return frames;
            }
            notified.await;
        }
    }

    fn lock_frames(&self) -> MutexGuard<'_, Vec<String>> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FrameWriter for MockSerialWriter {
    async fn write_frame(&mut self, frame: &str) -> Result<(), SerialError> {
        if self.is_closed() {
            return Err(SerialError::Closed);
        }
        if self.should_fail {
            return Err(SerialError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Mock write failure",
            )));
        }

        self.lock_frames().push(frame.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SerialError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Broker session recording whether it was disconnected
///
/// [`MockSession::fail_session`] makes the session fail for good, as a refused
/// reconnect would.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    disconnected: Arc<AtomicBool>,
    should_fail: bool,
    session_failed: Arc<Notify>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn was_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn fail_session(&self) {
        self.session_failed.notify_one();
    }
}

#[async_trait]
impl BrokerSession for MockSession {
    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.disconnected.store(true, Ordering::SeqCst);
        if self.should_fail {
            return Err(MqttError::DisconnectFailed("Mock disconnect failure".into()));
        }
        Ok(())
    }

    async fn wait_for_failure(&mut self) -> MqttError {
        self.session_failed.notified().await;
        MqttError::ConnectionFailed("Mock session failure".into())
    }
}
