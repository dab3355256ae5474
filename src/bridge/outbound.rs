//! MQTT → serial direction
//!
//! Commands wait in the [`OutboundQueue`] and go out at most one per tick, so
//! the cape never sees a burst of frames.

use super::queue::OutboundQueue;
use crate::observability::metrics;
use crate::protocol::{encode, FrameTrailer};
use crate::transport::{FrameWriter, SerialError};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty
    Idle,
    /// One frame written to the device
    Delivered { frame: String },
    /// One item removed but not written (encode or write failure)
    Dropped,
}

/// Drains the outbound queue onto the serial device
pub struct OutboundBridge<W> {
    writer: W,
    queue: OutboundQueue,
    trailer: FrameTrailer,
    tick_interval: Duration,
}

impl<W: FrameWriter> OutboundBridge<W> {
    pub fn new(
        writer: W,
        queue: OutboundQueue,
        trailer: FrameTrailer,
        tick_interval: Duration,
    ) -> Self {
        Self {
            writer,
            queue,
            trailer,
            tick_interval,
        }
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Deliver at most one queued command
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(item) = self.queue.pop() else {
            return TickOutcome::Idle;
        };

        let frame = match encode(&item.topic, &item.payload, self.trailer) {
            Ok(frame) => frame,
            Err(e) => {
                metrics().encode_failed();
                warn!(topic = %item.topic, error = %e, "Dropping command that cannot be encoded");
                return TickOutcome::Dropped;
            }
        };

        debug!("Sending this on serial: {}", frame);
        match self.writer.write_frame(&frame).await {
            Ok(()) => {
                metrics().command_delivered();
                TickOutcome::Delivered { frame }
            }
            Err(e) => {
                metrics().write_failed();
                warn!(topic = %item.topic, error = %e, "Serial write failed, command dropped");
                TickOutcome::Dropped
            }
        }
    }

    /// Tick forever at the configured interval
    ///
    /// The first tick fires immediately. Never returns; cancel by dropping the
    /// future.
    pub async fn run(&mut self) -> Infallible {
        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            trailer = ?self.trailer,
            "Outbound bridge started"
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Release the serial device
    pub async fn close(&mut self) -> Result<(), SerialError> {
        self.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OutboundItem;
    use crate::testing::mocks::MockSerialWriter;

    const TICK: Duration = Duration::from_millis(500);

    fn outbound(queue: &OutboundQueue, writer: &MockSerialWriter) -> OutboundBridge<MockSerialWriter> {
        OutboundBridge::new(writer.clone(), queue.clone(), FrameTrailer::Newline, TICK)
    }

    #[tokio::test]
    async fn test_tick_on_empty_queue_is_idle() {
        let queue = OutboundQueue::new();
        let writer = MockSerialWriter::new();
        let mut bridge = outbound(&queue, &writer);

        assert_eq!(bridge.tick().await, TickOutcome::Idle);
        assert!(writer.frames().is_empty());
    }

    #[tokio::test]
    async fn test_tick_delivers_exactly_one() {
        let queue = OutboundQueue::new();
        queue.push(OutboundItem::new("ninjaCape/output/1007", "FF0000"));
        queue.push(OutboundItem::new("ninjaCape/output/1007", "00FF00"));
        let writer = MockSerialWriter::new();
        let mut bridge = outbound(&queue, &writer);

        let outcome = bridge.tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Delivered {
                frame: "{\"DEVICE\":[{\"G\":\"0\",\"V\":0,\"D\":1007,\"DA\":\"FF0000\"}]}\n"
                    .to_string()
            }
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(writer.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_topic_is_dropped_and_ticking_continues() {
        let queue = OutboundQueue::new();
        queue.push(OutboundItem::new("ninjaCape/output/lamp", "1"));
        queue.push(OutboundItem::new("ninjaCape/output/7", "1"));
        let writer = MockSerialWriter::new();
        let mut bridge = outbound(&queue, &writer);

        assert_eq!(bridge.tick().await, TickOutcome::Dropped);
        assert!(matches!(bridge.tick().await, TickOutcome::Delivered { .. }));
        assert_eq!(writer.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_drops_item() {
        let queue = OutboundQueue::new();
        queue.push(OutboundItem::new("ninjaCape/output/7", "1"));
        let writer = MockSerialWriter::with_failure();
        let mut bridge = outbound(&queue, &writer);

        assert_eq!(bridge.tick().await, TickOutcome::Dropped);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_trailer_on_the_wire() {
        let queue = OutboundQueue::new();
        queue.push(OutboundItem::new("ninjaCape/output/1007", "FF0000"));
        let writer = MockSerialWriter::new();
        let mut bridge =
            OutboundBridge::new(writer.clone(), queue.clone(), FrameTrailer::Legacy, TICK);

        bridge.tick().await;

        assert_eq!(
            writer.frames(),
            vec!["{\"DEVICE\":[{\"G\":\"0\",\"V\":0,\"D\":1007,\"DA\":\"FF0000\"}]})".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_delivers_one_per_tick() {
        let queue = OutboundQueue::new();
        for payload in ["A", "B", "C"] {
            queue.push(OutboundItem::new("ninjaCape/output/1", payload));
        }
        let writer = MockSerialWriter::new();
        let mut bridge = outbound(&queue, &writer);

        // First tick is immediate, the second lands at 500ms
        let _ = tokio::time::timeout(Duration::from_millis(750), bridge.run()).await;

        assert_eq!(writer.frames().len(), 2);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_writer() {
        let writer = MockSerialWriter::new();
        let mut bridge = outbound(&OutboundQueue::new(), &writer);
        bridge.close().await.unwrap();
        assert!(writer.is_closed());
    }
}
