//! Impure I/O operations for the MQTT client
//!
//! [`MqttClient`] owns the rumqttc event loop. [`MqttClient::connect`] moves it
//! into a background task that tracks the connection state, re-subscribes on
//! every ConnAck and pushes received commands onto the [`OutboundQueue`].
//! Publishing goes through the cloneable [`MqttPublisher`] handle.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageDisposition, MessageHandler};
use crate::bridge::OutboundQueue;
use crate::config::MqttSection;
use crate::mqtt_span;
use crate::observability::metrics;
use crate::transport::{BrokerSession, Publisher};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, EventLoop};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// MQTT connection for the bridge
pub struct MqttClient {
    client: AsyncClient,
    broker: String,
    client_id: String,
    event_loop: Option<EventLoop>,
    connect_timeout: Duration,
    reconnect_config: ReconnectConfig,
    event_loop_handle: Option<JoinHandle<()>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
}

/// Cloneable publishing handle onto an [`MqttClient`] session
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
}

/// Everything the event-loop task owns
struct EventLoopContext {
    client: AsyncClient,
    queue: OutboundQueue,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
}

impl MqttClient {
    pub fn new(config: &MqttSection) -> Self {
        let mqtt_options = configure_mqtt_options(config);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            client,
            broker: format!("{}:{}", config.host, config.port),
            client_id: config.client_id.clone(),
            event_loop: Some(event_loop),
            connect_timeout: config.connect_timeout(),
            reconnect_config: ReconnectConfig::default(),
            event_loop_handle: None,
            state_tx,
            state_rx,
            shutdown_tx,
        }
    }

    /// Start the event loop and wait for the broker's ConnAck
    ///
    /// Commands received on `ninjaCape/output/#` are pushed onto `queue`. A
    /// refused session, a network failure before the first ConnAck, or no
    /// ConnAck within the connect timeout are returned as errors and stop the
    /// event loop.
    pub async fn connect(&mut self, queue: OutboundQueue) -> Result<(), MqttError> {
        let event_loop = self.event_loop.take().ok_or(MqttError::AlreadyStarted)?;

        let context = EventLoopContext {
            client: self.client.clone(),
            queue,
            state_tx: self.state_tx.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            reconnect_config: self.reconnect_config.clone(),
            reconnect_attempts: 0,
        };
        let span = mqtt_span!(broker = %self.broker, client_id = %self.client_id);
        self.event_loop_handle = Some(tokio::spawn(
            run_event_loop(event_loop, context).instrument(span),
        ));

        let confirmation =
            wait_for_connection_confirmation(self.state_rx.clone(), self.connect_timeout).await;
        if confirmation.is_err() {
            self.stop_event_loop();
        }
        confirmation
    }

    /// Send a Disconnect and wait for the event loop to finish
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(mut handle) = self.event_loop_handle.take() else {
            debug!("MQTT client was never started, nothing to disconnect");
            return Ok(());
        };

        let request = if handle.is_finished() {
            Ok(())
        } else {
            self.client
                .try_disconnect()
                .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))
        };
        if request.is_err() {
            let _ = self.shutdown_tx.send(true);
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(())) => info!("MQTT event loop shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT event loop ended with error: {}", e),
            Err(_) => {
                warn!("MQTT event loop didn't shut down gracefully, forcing abort");
                let _ = self.shutdown_tx.send(true);
                handle.abort();
            }
            _ => {}
        }

        if !HealthMonitor::is_terminal(&self.state_rx.borrow()) {
            self.state_tx
                .send_replace(ConnectionState::Disconnected("Client disconnected".to_string()));
        }
        metrics().mqtt_connection_lost();
        info!("MQTT client disconnected");
        request
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Publishing handle sharing this client's session
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
            state_rx: self.state_rx.clone(),
        }
    }

    fn stop_event_loop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Drop can't await disconnect(); only make sure the task stops
        self.stop_event_loop();
    }
}

#[async_trait]
impl BrokerSession for MqttClient {
    async fn disconnect(&mut self) -> Result<(), MqttError> {
        MqttClient::disconnect(self).await
    }

    async fn wait_for_failure(&mut self) -> MqttError {
        let mut state_rx = self.state_rx.clone();
        loop {
            let failed = match &*state_rx.borrow_and_update() {
                ConnectionState::Failed(reason) => Some(reason.clone()),
                _ => None,
            };
            if let Some(reason) = failed {
                return MqttError::ConnectionFailed(reason.into());
            }
            if state_rx.changed().await.is_err() {
                // Sender lives in self, so this only happens while dropping
                return std::future::pending().await;
            }
        }
    }
}

impl MqttPublisher {
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state = self.connection_state();
        if HealthMonitor::can_publish(&state) {
            Ok(())
        } else {
            Err(MqttError::NotConnected { state })
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    type Error = MqttError;

    /// Never waits on the request channel: while the broker is away the event
    /// loop stops draining it, and a full channel is reported as a failure.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        self.check_connection_state()?;
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }
}

/// Wait for connection confirmation (ConnAck) with timeout
async fn wait_for_connection_confirmation(
    mut state_rx: watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<(), MqttError> {
    let confirmation = tokio::time::timeout(timeout, async {
        loop {
            let state = state_rx.borrow_and_update().clone();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Failed(reason) | ConnectionState::Disconnected(reason) => {
                    return Err(MqttError::ConnectionFailed(reason.into()));
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting(_) => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(MqttError::ConnectionFailed(
                    "State channel closed".to_string().into(),
                ));
            }
        }
    })
    .await;

    confirmation.unwrap_or(Err(MqttError::ConnAckTimeout(timeout)))
}

async fn run_event_loop(mut event_loop: EventLoop, mut context: EventLoopContext) {
    info!("Starting MQTT event loop");
    let mut shutdown_rx = context.shutdown_rx.clone();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received, stopping MQTT event loop");
                    break;
                }
            }

            event_result = event_loop.poll() => {
                let keep_running = match event_result {
                    Ok(event) => {
                        let route = MessageHandler::route_mqtt_event(&event);
                        process_event_route(route, &mut context).await
                    }
                    Err(e) => handle_event_loop_error(e, &mut context).await,
                };
                if !keep_running {
                    break;
                }
            }
        }
    }
    info!("MQTT event loop stopped");
}

/// Returns true to continue the loop, false to stop it
async fn process_event_route(route: EventRoute, context: &mut EventLoopContext) -> bool {
    match route {
        EventRoute::ConnectionAcknowledged => {
            transition(&context.state_tx, ConnectionEvent::ConnAckReceived);
            metrics().mqtt_connection_established();
            context.reconnect_attempts = 0;
            subscribe_to_commands(&context.client);
            true
        }
        EventRoute::ConnectionRefused(reason) => {
            transition(&context.state_tx, ConnectionEvent::Refused(reason));
            false
        }
        EventRoute::MessageReceived { topic, payload } => {
            handle_message_received(&context.queue, &topic, payload);
            true
        }
        EventRoute::Disconnected => {
            transition(&context.state_tx, ConnectionEvent::DisconnectedByBroker);
            metrics().mqtt_connection_lost();
            schedule_reconnection(context).await
        }
        EventRoute::DisconnectSent => {
            debug!("Disconnect sent to broker");
            false
        }
        EventRoute::SubscriptionConfirmed { packet_id, granted } => {
            if granted {
                debug!(packet_id, "Subscription confirmed");
            } else {
                warn!(packet_id, "Broker rejected command subscription");
            }
            true
        }
        EventRoute::PublishAcknowledged { packet_id } => {
            debug!(packet_id, "Publish acknowledged");
            true
        }
        EventRoute::InfrastructureEvent(event_str) => {
            tracing::trace!(target: "mqtt_transport", "MQTT event: {}", event_str);
            true
        }
        EventRoute::OutgoingEvent => true,
    }
}

/// Returns true to keep polling, false if the failure is terminal
async fn handle_event_loop_error(error: ConnectionError, context: &mut EventLoopContext) -> bool {
    let event = match error {
        ConnectionError::ConnectionRefused(code) => ConnectionEvent::Refused(format!("{code:?}")),
        other => ConnectionEvent::NetworkError(other.to_string()),
    };

    let state = transition(&context.state_tx, event);
    if HealthMonitor::is_terminal(&state) {
        return false;
    }

    metrics().mqtt_connection_lost();
    schedule_reconnection(context).await
}

async fn schedule_reconnection(context: &mut EventLoopContext) -> bool {
    let decision = HealthMonitor::should_attempt_reconnection(
        context.reconnect_attempts,
        &context.reconnect_config,
        *context.shutdown_rx.borrow(),
    );

    match decision {
        ReconnectionDecision::Proceed { attempt, delay_ms } => {
            context.reconnect_attempts = attempt;
            transition(&context.state_tx, ConnectionEvent::ReconnectionStarted(attempt));
            debug!(attempt, delay_ms, "Waiting before next connection attempt");
            interruptible_sleep(context.shutdown_rx.clone(), delay_ms).await
        }
        ReconnectionDecision::AbortShutdownRequested => {
            info!("Shutdown signal received, stopping reconnection");
            false
        }
        ReconnectionDecision::AbortMaxAttemptsExceeded => {
            let reason = format!(
                "Max reconnection attempts ({}) exceeded",
                context.reconnect_attempts
            );
            transition(&context.state_tx, ConnectionEvent::PermanentFailure(reason));
            false
        }
    }
}

/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
    }
}

fn transition(state_tx: &watch::Sender<ConnectionState>, event: ConnectionEvent) -> ConnectionState {
    let current = state_tx.borrow().clone();
    let next = HealthMonitor::determine_next_state(&current, event);
    HealthMonitor::log_state_transition(&current, &next);
    state_tx.send_replace(next.clone());
    next
}

/// Runs on the task that drains the request channel, so it must not await.
fn subscribe_to_commands(client: &AsyncClient) {
    for topic in MessageHandler::subscription_topics() {
        match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
            Ok(()) => debug!(target: "mqtt_transport", "Subscribed to: {}", topic),
            Err(e) => error!("Failed to subscribe to {}: {}", topic, e),
        }
    }
}

fn handle_message_received(queue: &OutboundQueue, topic: &str, payload: Bytes) {
    match MessageHandler::classify_message(topic, payload) {
        MessageDisposition::Command(item) => {
            debug!(topic = %item.topic, payload_len = item.payload.len(), "Queued device command");
            metrics().command_queued();
            if let Some(evicted) = queue.push(item) {
                warn!(topic = %evicted.topic, "Outbound queue full, dropped oldest command");
                metrics().command_dropped();
            }
        }
        MessageDisposition::Unhandled => {
            debug!(topic, "Unhandled message");
        }
    }
}
