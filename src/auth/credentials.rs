//! AWS credentials used to sign websocket connections
//!
//! Resolution is delegated to the AWS SDK default provider chain: environment
//! variables, shared config and credentials files, SSO, web identity, container
//! and instance metadata, in that order.

use super::AuthError;
use aws_config::{BehaviorVersion, ConfigLoader, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use tracing::debug;

/// Resolve credentials for `region` through the default provider chain
pub async fn load_default_credentials(region: &str) -> Result<Credentials, AuthError> {
    let loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    load_credentials(loader).await
}

/// Resolve credentials through the provider chain `loader` builds
pub async fn load_credentials(loader: ConfigLoader) -> Result<Credentials, AuthError> {
    let sdk_config = loader.load().await;
    let provider = sdk_config
        .credentials_provider()
        .ok_or(AuthError::NoCredentialsProvider)?;
    credentials_from(&provider).await
}

pub async fn credentials_from(
    provider: &impl ProvideCredentials,
) -> Result<Credentials, AuthError> {
    let credentials = provider.provide_credentials().await?;
    debug!(
        access_key_id = credentials.access_key_id(),
        temporary = credentials.session_token().is_some(),
        "Resolved AWS credentials"
    );
    Ok(credentials)
}
