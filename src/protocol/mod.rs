//! Payload format exchanged on the session topic

pub mod messages;

pub use messages::{EchoMessage, PayloadError};
