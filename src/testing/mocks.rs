//! Mock implementations for testing
//!
//! [`MockConnection`] stands in for the broker: it records every publish and
//! can echo publishes back to subscribers the way a broker with a matching
//! subscription would.

use crate::transport::{Connection, InboundMessage, QoS};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// Error raised by [`MockConnection`]
#[derive(Debug, Error)]
#[error("Mock {0}")]
pub struct MockError(pub String);

/// A publish seen by the mock, with the (possibly paused) clock reading
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub at: Instant,
}

type Subscribers = Arc<Mutex<Vec<(String, mpsc::Sender<InboundMessage>)>>>;

/// Mock broker connection for testing
#[derive(Debug, Default)]
pub struct MockConnection {
    pub published: Arc<Mutex<Vec<RecordedPublish>>>,
    subscribers: Subscribers,
    connected: AtomicBool,
    disconnects: AtomicU32,
    /// Copies of each publish delivered back to subscribers
    echo_copies: usize,
    fail_connect: bool,
    fail_subscribe: bool,
    fail_disconnect: bool,
    /// Publishes beyond this many fail
    fail_publish_after: Option<usize>,
}

impl MockConnection {
    /// A broker that accepts everything and never delivers
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that delivers every publish back once
    pub fn echoing() -> Self {
        Self::new().with_echo_copies(1)
    }

    /// Deliver each publish `copies` times, as at-least-once redelivery can
    pub fn with_echo_copies(mut self, copies: usize) -> Self {
        self.echo_copies = copies;
        self
    }

    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn with_subscribe_failure(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub fn with_disconnect_failure(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn with_publish_failure_after(mut self, successful: usize) -> Self {
        self.fail_publish_after = Some(successful);
        self
    }

    pub async fn get_published(&self) -> Vec<RecordedPublish> {
        self.published.lock().await.clone()
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .await
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Deliver a raw payload to subscribers of `topic`
    pub async fn inject(&self, topic: &str, payload: Vec<u8>) {
        let subscribers = self.subscribers.lock().await;
        for (_, sender) in subscribers.iter().filter(|(t, _)| t == topic) {
            let _ = sender
                .send(InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .await;
        }
    }

    /// Drop every subscriber channel, as a connection lost for good would
    pub async fn drop_subscribers(&self) {
        self.subscribers.lock().await.clear();
    }
}

#[async_trait]
impl Connection for MockConnection {
    type Error = MockError;

    async fn connect(&self) -> Result<(), Self::Error> {
        if self.fail_connect {
            return Err(MockError("connection failure".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _qos: QoS,
        sender: mpsc::Sender<InboundMessage>,
    ) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MockError("subscribe before connect".to_string()));
        }
        if self.fail_subscribe {
            return Err(MockError("subscription rejected".to_string()));
        }

        self.subscribers
            .lock()
            .await
            .push((topic.to_string(), sender));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MockError("publish before connect".to_string()));
        }

        {
            let mut published = self.published.lock().await;
            if let Some(limit) = self.fail_publish_after {
                if published.len() >= limit {
                    return Err(MockError("publish failure".to_string()));
                }
            }
            published.push(RecordedPublish {
                topic: topic.to_string(),
                payload: payload.clone(),
                qos,
                at: Instant::now(),
            });
        }

        for _ in 0..self.echo_copies {
            self.inject(topic, payload.clone()).await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if self.fail_disconnect {
            return Err(MockError("disconnect failure".to_string()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_publishes() {
        let connection = MockConnection::new();
        connection.connect().await.unwrap();

        connection
            .publish("test/topic", b"one".to_vec(), QoS::AtLeastOnce)
            .await
            .unwrap();

        let published = connection.get_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "test/topic");
        assert_eq!(published[0].payload, b"one");
    }

    #[tokio::test]
    async fn test_mock_echoes_to_matching_subscribers() {
        let connection = MockConnection::echoing().with_echo_copies(2);
        connection.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        connection
            .subscribe("test/topic", QoS::AtLeastOnce, tx)
            .await
            .unwrap();
        connection
            .publish("test/topic", b"hi".to_vec(), QoS::AtLeastOnce)
            .await
            .unwrap();
        connection
            .publish("other/topic", b"no".to_vec(), QoS::AtLeastOnce)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, b"hi");
        assert_eq!(rx.recv().await.unwrap().payload, b"hi");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mock_requires_connect() {
        let connection = MockConnection::new();
        assert!(connection
            .publish("test/topic", vec![], QoS::AtLeastOnce)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mock_publish_failure_after_limit() {
        let connection = MockConnection::new().with_publish_failure_after(1);
        connection.connect().await.unwrap();

        assert!(connection
            .publish("t", vec![1], QoS::AtLeastOnce)
            .await
            .is_ok());
        assert!(connection
            .publish("t", vec![2], QoS::AtLeastOnce)
            .await
            .is_err());
        assert_eq!(connection.get_published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_drop_subscribers_closes_channel() {
        let connection = MockConnection::new();
        connection.connect().await.unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        connection
            .subscribe("test/topic", QoS::AtLeastOnce, tx)
            .await
            .unwrap();
        connection.drop_subscribers().await;

        assert!(rx.recv().await.is_none());
    }
}
