//! Bridge lifecycle management
//!
//! The supervisor owns startup (pins, serial, broker), runs both directions
//! and tears everything down again:
//!
//! ```text
//! Init → Connecting → Running → ShuttingDown → Stopped
//! ```
//!
//! Any startup failure jumps straight to `Stopped`.

use super::inbound::InboundBridge;
use super::outbound::OutboundBridge;
use super::queue::OutboundQueue;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle_span;
use crate::observability::metrics;
use crate::platform::configure_uart_pins;
use crate::serial_span;
use crate::transport::mqtt::MqttClient;
use crate::transport::serial::{dummy_serial, open_serial};
use crate::transport::{BrokerSession, FrameReader, FrameWriter, Publisher};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    Connecting,
    Running,
    ShuttingDown,
    Stopped,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Init => "init",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Running => "running",
            SupervisorState::ShuttingDown => "shutting_down",
            SupervisorState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the running phase ended
enum StopReason {
    Interrupted,
    InboundFailed(BridgeError),
    SessionFailed(BridgeError),
}

/// Runs the bridge from configuration to shutdown
pub struct Supervisor {
    config: BridgeConfig,
    state_tx: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(config: BridgeConfig) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Init);
        Self { config, state_tx }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Start the bridge and run it until `shutdown` resolves, the serial
    /// stream is lost or the MQTT session fails for good
    ///
    /// Returns `Ok` after an interrupt and `Err` otherwise.
    pub async fn run<F>(&self, shutdown: F) -> BridgeResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let span = lifecycle_span!(client_id = %self.config.mqtt.client_id);
        async {
            self.transition(SupervisorState::Init);

            if let Err(e) = configure_uart_pins(&self.config.serial.uart_pins).await {
                return self.fail_startup(e.into());
            }

            let (reader, mut writer) = match self.open_serial() {
                Ok(pair) => pair,
                Err(e) => return self.fail_startup(e),
            };

            let queue = OutboundQueue::bounded(self.config.bridge.queue_capacity);
            let mut mqtt = MqttClient::new(&self.config.mqtt);

            self.transition(SupervisorState::Connecting);
            info!(
                host = %self.config.mqtt.host,
                port = self.config.mqtt.port,
                auth = self.config.mqtt.auth.enabled,
                "Connecting to MQTT broker"
            );
            if let Err(e) = mqtt.connect(queue.clone()).await {
                if let Err(close_err) = writer.close().await {
                    warn!(error = %close_err, "Failed to close serial port");
                }
                return self.fail_startup(e.into());
            }

            let publisher = Arc::new(mqtt.publisher());
            self.supervise(reader, writer, publisher, &mut mqtt, queue, shutdown)
                .await
        }
        .instrument(span)
        .await
    }

    /// Run both directions over already-open transports until `shutdown`
    /// resolves, the inbound task ends or the broker session fails, then
    /// release the broker session and the serial writer
    ///
    /// Cleanup always attempts both steps; their errors are logged and do not
    /// change the result.
    pub async fn supervise<R, W, P, S, F>(
        &self,
        reader: R,
        writer: W,
        publisher: Arc<P>,
        session: &mut S,
        queue: OutboundQueue,
        shutdown: F,
    ) -> BridgeResult<()>
    where
        R: FrameReader + 'static,
        W: FrameWriter,
        P: Publisher + 'static,
        S: BrokerSession,
        F: Future<Output = ()> + Send,
    {
        self.transition(SupervisorState::Running);

        let inbound = InboundBridge::new(reader, publisher);
        let mut inbound_handle =
            tokio::spawn(inbound.run().instrument(serial_span!(direction = "inbound")));

        let mut outbound = OutboundBridge::new(
            writer,
            queue,
            self.config.protocol.frame_trailer,
            self.config.bridge.tick_interval(),
        );

        info!("Bridge running");
        let reason = {
            let outbound_loop = outbound
                .run()
                .instrument(serial_span!(direction = "outbound"));
            tokio::pin!(shutdown);
            tokio::select! {
                _ = &mut shutdown => StopReason::Interrupted,
                joined = &mut inbound_handle => StopReason::InboundFailed(match joined {
                    Ok(Ok(())) => BridgeError::SerialClosed,
                    Ok(Err(e)) => e,
                    Err(e) => BridgeError::task_failed("inbound", e.to_string()),
                }),
                failure = session.wait_for_failure() => StopReason::SessionFailed(failure.into()),
                never = outbound_loop => match never {},
            }
        };

        self.transition(SupervisorState::ShuttingDown);
        match &reason {
            StopReason::Interrupted => info!("Interrupt received"),
            StopReason::InboundFailed(e) if e.is_serial_loss() => {
                error!(error = %e, "Lost the serial connection to the cape")
            }
            StopReason::InboundFailed(e) => error!(error = %e, "Inbound bridge stopped"),
            StopReason::SessionFailed(e) => error!(error = %e, "MQTT session failed for good"),
        }

        inbound_handle.abort();

        let mut cleanup_errors: Vec<String> = Vec::new();
        if let Err(e) = session.disconnect().await {
            cleanup_errors.push(format!("MQTT disconnect: {e}"));
        }
        if let Err(e) = outbound.close().await {
            cleanup_errors.push(format!("serial close: {e}"));
        }
        for cleanup_error in &cleanup_errors {
            warn!("Cleanup step failed: {}", cleanup_error);
        }

        let discarded = outbound.queue().clear();
        if discarded > 0 {
            warn!(discarded, "Discarded commands that were never delivered");
        }

        self.transition(SupervisorState::Stopped);
        self.log_metrics();

        match reason {
            StopReason::Interrupted => Ok(()),
            StopReason::InboundFailed(e) | StopReason::SessionFailed(e) => Err(e),
        }
    }

    fn open_serial(&self) -> BridgeResult<(Box<dyn FrameReader>, Box<dyn FrameWriter>)> {
        let serial = &self.config.serial;
        if serial.dummy {
            let (reader, writer) = dummy_serial();
            return Ok((Box::new(reader), Box::new(writer)));
        }

        info!("Connecting... {}", serial.path);
        let (reader, writer) = open_serial(&serial.path, serial.baud_rate)?;
        Ok((Box::new(reader), Box::new(writer)))
    }

    fn fail_startup(&self, error: BridgeError) -> BridgeResult<()> {
        error!(error = %error, state = %self.state(), "Bridge startup failed");
        self.transition(SupervisorState::Stopped);
        Err(error)
    }

    fn transition(&self, next: SupervisorState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Bridge state changed");
        }
        metrics().set_bridge_state(next.as_str());
    }

    fn log_metrics(&self) {
        match serde_json::to_string(&metrics().get_metrics()) {
            Ok(snapshot) => info!(metrics = %snapshot, "Bridge stopped"),
            Err(e) => warn!(error = %e, "Failed to render metrics snapshot"),
        }
    }
}
