//! MQTT connection to the broker
//!
//! The module separates pure functions from I/O for testability:
//!
//! - [`connection`] - connection state, reconnection policy and option building
//! - [`tls`] - rustls configurations for mutual TLS and websockets
//! - [`message_handler`] - routing of `rumqttc` events
//! - [`health_monitor`] - reconnection decisions and state transitions
//! - [`client`] - the event loop and broker round trips
//!
//! # Usage
//!
//! ```rust,no_run
//! use iot_pubsub::config::{SessionConfig, SessionSettings};
//! use iot_pubsub::transport::mqtt::MqttConnection;
//! use iot_pubsub::transport::{InboundMessage, QoS};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_settings(SessionSettings {
//!     endpoint: Some("example-ats.iot.us-east-1.amazonaws.com".to_string()),
//!     cert: Some("device.pem.crt".into()),
//!     key: Some("private.pem.key".into()),
//!     ..Default::default()
//! })?;
//!
//! let connection = MqttConnection::new(&config).await?;
//! connection.connect().await?;
//!
//! let (tx, _rx) = tokio::sync::mpsc::channel::<InboundMessage>(16);
//! connection.subscribe(&config.topic, QoS::AtLeastOnce, tx).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;
pub mod tls;

pub use client::MqttConnection;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
