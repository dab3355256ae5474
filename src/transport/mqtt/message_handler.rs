//! Pure message routing for MQTT events
//!
//! The event-loop task feeds every rumqttc event through
//! [`MessageHandler::route_mqtt_event`] and acts on the resulting route.

use crate::protocol::{topic_matches, OutboundItem, OUTPUT_FILTER};
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, SubscribeReasonCode};
use rumqttc::v5::Event;
use rumqttc::Outgoing;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => match connack.code {
                    ConnectReturnCode::Success => EventRoute::ConnectionAcknowledged,
                    code => EventRoute::ConnectionRefused(format!("{code:?}")),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    granted: suback
                        .return_codes
                        .iter()
                        .all(|code| matches!(code, SubscribeReasonCode::Success(_))),
                },
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged {
                    packet_id: puback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Topics to (re)subscribe after every ConnAck
    pub fn subscription_topics() -> Vec<String> {
        vec![OUTPUT_FILTER.to_string()]
    }

    /// Decide what to do with a message received from the broker
    pub fn classify_message(topic: &str, payload: Bytes) -> MessageDisposition {
        if topic_matches(OUTPUT_FILTER, topic) {
            MessageDisposition::Command(OutboundItem::new(topic, payload))
        } else {
            MessageDisposition::Unhandled
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Session accepted by the broker
    ConnectionAcknowledged,
    /// ConnAck carried a failure code
    ConnectionRefused(String),
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// Broker sent a Disconnect
    Disconnected,
    /// Our own Disconnect went out; the session is over
    DisconnectSent,
    /// SubAck; `granted` is false if any filter was rejected
    SubscriptionConfirmed { packet_id: u16, granted: bool },
    /// PubAck for a QoS 1 publish
    PublishAcknowledged { packet_id: u16 },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// What a received message means to the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDisposition {
    /// A device command to queue for the serial device
    Command(OutboundItem),
    /// Outside the command filter; logged and ignored
    Unhandled,
}
