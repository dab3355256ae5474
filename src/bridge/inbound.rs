//! Serial → MQTT direction
//!
//! Reads one line at a time from the cape, decodes it and republishes device
//! state on the broker. Bad lines are logged and skipped; only the loss of
//! the serial stream ends the loop.

use crate::error::{BridgeError, BridgeResult};
use crate::observability::metrics;
use crate::protocol::{decode, DecodeError, DecodedFrame};
use crate::transport::{FrameReader, Publisher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one serial line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Empty or whitespace-only line
    Blank,
    /// Device state republished on `topic`
    Published { topic: String },
    /// Device state decoded but the broker publish failed
    PublishFailed { topic: String },
    /// Acknowledgement; logged only
    Ack,
    /// Valid JSON without a known key
    Unknown,
    /// Line could not be decoded
    Rejected(DecodeError),
}

/// Reads cape frames and publishes device events
pub struct InboundBridge<R, P> {
    reader: R,
    publisher: Arc<P>,
}

impl<R, P> InboundBridge<R, P>
where
    R: FrameReader,
    P: Publisher,
{
    pub fn new(reader: R, publisher: Arc<P>) -> Self {
        Self { reader, publisher }
    }

    /// Process lines until the serial stream ends
    ///
    /// Never returns `Ok`: end of stream yields [`BridgeError::SerialClosed`]
    /// and a read failure yields [`BridgeError::SerialRead`].
    pub async fn run(mut self) -> BridgeResult<()> {
        info!("Inbound bridge started");
        loop {
            match self.reader.read_line().await {
                Ok(Some(line)) => {
                    process_line(self.publisher.as_ref(), &line).await;
                }
                Ok(None) => {
                    warn!("Serial stream ended");
                    return Err(BridgeError::SerialClosed);
                }
                Err(source) => {
                    warn!(error = %source, "Serial read failed");
                    return Err(BridgeError::SerialRead { source });
                }
            }
        }
    }

    /// Decode one line and act on it
    pub async fn handle_line(&self, line: &str) -> LineOutcome {
        process_line(self.publisher.as_ref(), line).await
    }
}

// Borrows only the publisher: the reader is Send but not Sync
async fn process_line<P: Publisher>(publisher: &P, line: &str) -> LineOutcome {
    let cleaned = line.trim();
    if cleaned.is_empty() {
        return LineOutcome::Blank;
    }

    metrics().frame_received();
    debug!("Received from ninja cape: {}", cleaned);

    match decode(cleaned) {
        Ok(DecodedFrame::Device(event)) => {
            metrics().device_event();
            let topic = event.input_topic();
            debug!(topic = %topic, message = %event.data, "Publishing MQTT");

            match publisher.publish(&topic, event.data.into_bytes()).await {
                Ok(()) => {
                    metrics().event_published();
                    LineOutcome::Published { topic }
                }
                Err(e) => {
                    metrics().publish_failed();
                    warn!(topic = %topic, error = %e, "Failed to publish device event");
                    LineOutcome::PublishFailed { topic }
                }
            }
        }
        Ok(DecodedFrame::Ack(ack)) => {
            metrics().ack_event();
            info!(
                device = %format!("{}_{}", ack.device_id, ack.group_id),
                message = %ack.data,
                "ACK from ninjaCape"
            );
            LineOutcome::Ack
        }
        Ok(DecodedFrame::Unknown(frame)) => {
            metrics().unknown_frame();
            info!("Unknown message type: {}", frame);
            LineOutcome::Unknown
        }
        Err(e) => {
            metrics().decode_error();
            match e.field() {
                Some(field) => warn!(field, error = %e, "Discarding frame with bad field"),
                None => warn!(error = %e, line = %cleaned, "Discarding undecodable line"),
            }
            LineOutcome::Rejected(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockPublisher, MockSerialReader};
    use crate::transport::SerialError;

    fn bridge(publisher: &Arc<MockPublisher>) -> InboundBridge<MockSerialReader, MockPublisher> {
        let (reader, _lines) = MockSerialReader::new();
        InboundBridge::new(reader, publisher.clone())
    }

    #[tokio::test]
    async fn test_device_frame_is_published() {
        let publisher = Arc::new(MockPublisher::new());
        let bridge = bridge(&publisher);

        let outcome = bridge
            .handle_line("{\"DEVICE\":[{\"G\":\"0\",\"V\":0,\"D\":1007,\"DA\":\"FFFF00\"}]}\r\n")
            .await;

        assert_eq!(
            outcome,
            LineOutcome::Published {
                topic: "ninjaCape/input/1007_0".to_string()
            }
        );
        assert_eq!(
            publisher.published().await,
            vec![("ninjaCape/input/1007_0".to_string(), b"FFFF00".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_ack_publishes_nothing() {
        let publisher = Arc::new(MockPublisher::new());
        let bridge = bridge(&publisher);

        let outcome = bridge
            .handle_line(r#"{"ACK":[{"G":"0","V":0,"D":1007,"DA":"FFFF00"}]}"#)
            .await;

        assert_eq!(outcome, LineOutcome::Ack);
        assert!(publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_lines_are_skipped() {
        let publisher = Arc::new(MockPublisher::new());
        let bridge = bridge(&publisher);

        assert_eq!(bridge.handle_line("   \r\n").await, LineOutcome::Blank);
        assert!(matches!(
            bridge.handle_line("not json").await,
            LineOutcome::Rejected(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            bridge.handle_line(r#"{"DEVICE":[{"G":"0","D":1}]}"#).await,
            LineOutcome::Rejected(DecodeError::MissingField { field: "DA", .. })
        ));
        assert_eq!(
            bridge.handle_line(r#"{"PLUGIN":[]}"#).await,
            LineOutcome::Unknown
        );
        assert!(publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_not_fatal() {
        let publisher = Arc::new(MockPublisher::with_failure());
        let bridge = bridge(&publisher);

        let outcome = bridge
            .handle_line(r#"{"DEVICE":[{"G":"0","V":0,"D":11,"DA":"1"}]}"#)
            .await;

        assert_eq!(
            outcome,
            LineOutcome::PublishFailed {
                topic: "ninjaCape/input/11_0".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_run_ends_with_serial_closed() {
        let publisher = Arc::new(MockPublisher::new());
        let (reader, lines) = MockSerialReader::new();
        lines
            .send(Ok(r#"{"DEVICE":[{"G":"0","V":0,"D":1,"DA":"x"}]}"#.to_string()))
            .unwrap();
        drop(lines);

        let result = InboundBridge::new(reader, publisher.clone()).run().await;

        assert!(matches!(result, Err(BridgeError::SerialClosed)));
        assert_eq!(publisher.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_ends_with_read_error() {
        let publisher = Arc::new(MockPublisher::new());
        let (reader, lines) = MockSerialReader::new();
        lines.send(Err(SerialError::Closed)).unwrap();

        let result = InboundBridge::new(reader, publisher).run().await;

        assert!(matches!(result, Err(BridgeError::SerialRead { .. })));
    }
}
