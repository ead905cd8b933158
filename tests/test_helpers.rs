//! Test helpers and utilities for integration tests

use iot_pubsub::protocol::EchoMessage;
use iot_pubsub::session::SessionPlan;
use iot_pubsub::testing::RecordedPublish;
use std::time::Duration;

/// Session plan on the default topic with a generous timeout
#[allow(dead_code)]
pub fn test_plan(count: u32) -> SessionPlan {
    SessionPlan {
        topic: "test/topic".to_string(),
        count,
        message: "Hello world!".to_string(),
        timeout: Duration::from_secs(60),
    }
}

/// Decode every recorded publish, panicking on malformed payloads
#[allow(dead_code)]
pub fn decode_all(published: &[RecordedPublish]) -> Vec<EchoMessage> {
    published
        .iter()
        .map(|p| EchoMessage::decode(&p.payload).expect("published payload must decode"))
        .collect()
}
