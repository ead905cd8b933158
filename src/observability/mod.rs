//! Observability: structured logging for the session and the MQTT client

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
