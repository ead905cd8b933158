//! Session error types
//!
//! Every failure of a session, whatever layer it comes from, ends up as one
//! [`SessionError`] resolving the session's completion signal.

use crate::config::ConfigError;
use crate::protocol::PayloadError;
use std::time::Duration;
use thiserror::Error;

/// Boxed error raised by a [`crate::transport::Connection`] implementation
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection failed: {0}")]
    Connection(#[source] BoxError),

    #[error("Subscription to {topic} failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: BoxError,
    },

    #[error("Publishing message {sequence} failed: {source}")]
    Publish {
        sequence: u32,
        #[source]
        source: BoxError,
    },

    #[error("Received malformed message on {topic}: {source}")]
    Payload {
        topic: String,
        #[source]
        source: PayloadError,
    },

    #[error("Connection lost before message {expected} was echoed")]
    ConnectionLost { expected: u32 },

    #[error("Session did not complete within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl SessionError {
    pub fn connection<E: Into<BoxError>>(error: E) -> Self {
        Self::Connection(error.into())
    }

    pub fn subscribe<S: Into<String>, E: Into<BoxError>>(topic: S, error: E) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            source: error.into(),
        }
    }

    pub fn publish<E: Into<BoxError>>(sequence: u32, error: E) -> Self {
        Self::Publish {
            sequence,
            source: error.into(),
        }
    }

    pub fn payload<S: Into<String>>(topic: S, error: PayloadError) -> Self {
        Self::Payload {
            topic: topic.into(),
            source: error,
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
