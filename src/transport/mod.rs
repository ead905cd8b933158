//! Transport layer for the pub/sub session
//!
//! [`Connection`] abstracts the broker connection so the session can be driven
//! against the real MQTT client or an in-memory double.

use tokio::sync::mpsc;

pub mod mqtt;

pub use rumqttc::QoS;

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broker connection used by the session
///
/// All methods take `&self` so one connection can be shared between the
/// publishing tasks and the orchestrator.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolve once the broker has accepted the connection
    async fn connect(&self) -> Result<(), Self::Error>;

    /// Resolve once the broker has acknowledged the subscription.
    /// Messages on `topic` are delivered to `sender`; the channel is closed
    /// when the connection is lost for good.
    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        sender: mpsc::Sender<InboundMessage>,
    ) -> Result<(), Self::Error>;

    /// Resolve once the publish has been handed to the client
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), Self::Error>;

    /// Close the connection. Safe to call when never connected.
    async fn disconnect(&self) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;
}
