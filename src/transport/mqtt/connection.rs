//! Pure connection state management for the MQTT connection
//!
//! Connection state, reconnection policy, error types and the translation of a
//! [`SessionConfig`] into `rumqttc` options live here; none of it performs I/O
//! beyond reading certificate files.

use super::tls;
use crate::auth::{load_default_credentials, presign_websocket_url, AuthError};
use crate::config::{AuthMode, SessionConfig, DEFAULT_WEBSOCKET_PORT};
use rumqttc::{MqttOptions, Proxy, ProxyAuth, ProxyType, Transport};
use std::time::SystemTime;
use thiserror::Error;

/// Connection state of the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Transient failure, retrying (attempt count)
    Reconnecting(u32),
    /// Reconnection attempts exhausted
    PermanentlyDisconnected(String),
}

/// Reconnection policy applied after the connection was established once
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay used once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            backoff_pattern: vec![250, 500, 1000],
            sustained_delay: 1000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Broker rejected subscription to {0}")]
    SubscriptionRejected(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Websocket authentication failed: {0}")]
    Credentials(#[from] AuthError),
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Build `rumqttc` options for the session: transport, credentials,
/// keep-alive and session persistence.
///
/// Websocket sessions resolve AWS credentials here, which may reach out to
/// the instance metadata service.
pub async fn configure_mqtt_options(config: &SessionConfig) -> Result<MqttOptions, MqttError> {
    let mut mqtt_options = match &config.auth {
        AuthMode::MutualTls { cert, key } => {
            let tls_config = tls::mutual_tls_config(
                config.ca_file.as_deref(),
                cert,
                key,
                tls::needs_alpn(config.port),
            )?;
            let mut options = MqttOptions::new(&config.client_id, &config.endpoint, config.port);
            options.set_transport(Transport::tls_with_config(tls_config.into()));
            options
        }
        AuthMode::Websocket {
            signing_region,
            proxy,
        } => {
            let credentials = load_default_credentials(signing_region).await?;
            let url = presign_websocket_url(
                &websocket_authority(&config.endpoint, config.port),
                signing_region,
                &credentials,
                SystemTime::now(),
            )?;
            let tls_config = tls::server_auth_config(config.ca_file.as_deref())?;

            // Port is ignored for websocket transports, the URL carries it
            let mut options = MqttOptions::new(&config.client_id, url, config.port);
            options.set_transport(Transport::wss_with_config(tls_config.into()));
            if let Some(proxy) = proxy {
                options.set_proxy(Proxy {
                    ty: ProxyType::Http,
                    auth: ProxyAuth::None,
                    addr: proxy.host.clone(),
                    port: proxy.port,
                });
            }
            options
        }
    };

    mqtt_options.set_keep_alive(config.keep_alive);
    mqtt_options.set_clean_session(config.clean_session);

    Ok(mqtt_options)
}

/// Host header value signed into the websocket URL
pub fn websocket_authority(endpoint: &str, port: u16) -> String {
    if port == DEFAULT_WEBSOCKET_PORT {
        endpoint.to_string()
    } else {
        format!("{endpoint}:{port}")
    }
}
