//! Pure routing of `rumqttc` events

use super::connection::MqttError;
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};
use tracing::debug;

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK received
    ConnectionAcknowledged { session_present: bool },
    /// PUBLISH received on a subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// SUBACK received
    SubscriptionAcknowledged {
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// Broker closed the session
    Disconnected,
    /// Our DISCONNECT has been written to the network
    DisconnectSent,
    /// PingResp, PubAck and the like
    InfrastructureEvent(String),
    /// Any other outgoing packet
    OutgoingEvent,
}

pub struct MessageHandler;

impl MessageHandler {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    return_codes: suback.return_codes.clone(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Retained messages predate the session and must not count as echoes
    pub fn should_forward(topic: &str, retain: bool) -> bool {
        if retain {
            debug!("Ignoring retained message on topic: {}", topic);
            return false;
        }
        true
    }

    pub fn validate_subscription(
        topic: &str,
        return_codes: &[SubscribeReasonCode],
    ) -> Result<(), MqttError> {
        if return_codes.is_empty()
            || return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            return Err(MqttError::SubscriptionRejected(topic.to_string()));
        }
        Ok(())
    }
}
