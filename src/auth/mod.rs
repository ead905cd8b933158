//! Credentials and request signing for websocket connections

pub mod credentials;
pub mod sigv4;

pub use credentials::load_default_credentials;
pub use sigv4::presign_websocket_url;

use aws_credential_types::provider::error::CredentialsError;
use thiserror::Error;

/// Failures resolving credentials or presigning the websocket URL
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No AWS credentials provider is configured")]
    NoCredentialsProvider,
    #[error("Failed to resolve AWS credentials: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("Failed to presign websocket URL: {0}")]
    Signing(#[source] Box<dyn std::error::Error + Send + Sync>),
}
