//! IoT pub/sub echo session
//!
//! Connects to an MQTT broker over mutual TLS or a SigV4-signed websocket,
//! subscribes to a topic, publishes a numbered series of JSON messages to it
//! one second apart, and completes once the last message is echoed back.
//!
//! # Quick Start
//!
//! ```rust
//! use iot_pubsub::protocol::EchoMessage;
//!
//! let message = EchoMessage::new("Hello world!", 3);
//! let payload = message.encode().unwrap();
//!
//! let echoed = EchoMessage::decode(&payload).unwrap();
//! assert!(echoed.is_final(3));
//! ```
//!
//! A full session runs over any [`transport::Connection`]:
//!
//! ```rust
//! use iot_pubsub::session::{SessionOrchestrator, SessionPlan};
//! use iot_pubsub::testing::MockConnection;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let plan = SessionPlan {
//!     topic: "test/topic".to_string(),
//!     count: 1,
//!     message: "Hello world!".to_string(),
//!     timeout: Duration::from_secs(5),
//! };
//!
//! let mut session = SessionOrchestrator::new(MockConnection::echoing(), plan);
//! let summary = session.run().await.unwrap();
//! assert_eq!(summary.received, 1);
//! # }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{SessionConfig, SessionSettings};
pub use error::{SessionError, SessionResult};
pub use protocol::*;
pub use session::{SessionOrchestrator, SessionSummary};
pub use transport::mqtt::MqttConnection;
