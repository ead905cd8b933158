//! Session configuration
//!
//! A [`SessionConfig`] is resolved exactly once per process from command-line
//! flags, an optional TOML file and built-in defaults, in that order of
//! precedence. All validation happens here, before any network action.

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TOPIC: &str = "test/topic";
pub const DEFAULT_COUNT: u32 = 10;
pub const DEFAULT_MESSAGE: &str = "Hello world!";
pub const DEFAULT_SIGNING_REGION: &str = "us-east-1";
pub const DEFAULT_PROXY_PORT: u16 = 8080;
pub const DEFAULT_MTLS_PORT: u16 = 8883;
pub const DEFAULT_WEBSOCKET_PORT: u16 = 443;
/// Lower bound of the default session timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Grace period added on top of the publish window for long sessions
const TIMEOUT_GRACE_SECS: u64 = 10;
const KEEP_ALIVE_SECS: u64 = 60;
const CLIENT_ID_RANGE: u32 = 100_000_000;

/// Client library log level, as accepted by `--verbosity`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    #[default]
    None,
}

/// How the client authenticates to the broker
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMode {
    /// Raw MQTT over TLS with a client certificate
    MutualTls { cert: PathBuf, key: PathBuf },
    /// MQTT over a SigV4-signed websocket, optionally through an HTTP proxy
    Websocket {
        signing_region: String,
        proxy: Option<ProxySettings>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

/// Partially specified settings, as read from the command line or a TOML file.
///
/// Every key is optional; [`SessionSettings::or`] layers two sources and
/// [`SessionConfig::from_settings`] fills in defaults and validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub ca_file: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub client_id: Option<String>,
    pub topic: Option<String>,
    pub count: Option<u32>,
    pub use_websocket: Option<bool>,
    pub signing_region: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub message: Option<String>,
    pub verbosity: Option<Verbosity>,
    /// Session timeout in seconds
    pub timeout: Option<u64>,
}

/// Immutable configuration of one publish/subscribe session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub endpoint: String,
    pub port: u16,
    pub ca_file: Option<PathBuf>,
    pub auth: AuthMode,
    pub client_id: String,
    pub topic: String,
    pub count: u32,
    pub message: String,
    pub verbosity: Verbosity,
    /// Upper bound for the whole session once connected
    pub timeout: Duration,
    pub keep_alive: Duration,
    pub clean_session: bool,
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Missing required option: {0}")]
    MissingOption(&'static str),
    #[error("Invalid endpoint '{0}': expected a bare host name")]
    InvalidEndpoint(String),
    #[error("Invalid topic '{0}': publish topics must be non-empty and free of wildcards")]
    InvalidTopic(String),
    #[error("Invalid client id '{0}'")]
    InvalidClientId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionSettings {
    /// Load settings from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Take every value set on `self`, falling back to `fallback` field by field
    pub fn or(self, fallback: SessionSettings) -> SessionSettings {
        SessionSettings {
            endpoint: self.endpoint.or(fallback.endpoint),
            port: self.port.or(fallback.port),
            ca_file: self.ca_file.or(fallback.ca_file),
            cert: self.cert.or(fallback.cert),
            key: self.key.or(fallback.key),
            client_id: self.client_id.or(fallback.client_id),
            topic: self.topic.or(fallback.topic),
            count: self.count.or(fallback.count),
            use_websocket: self.use_websocket.or(fallback.use_websocket),
            signing_region: self.signing_region.or(fallback.signing_region),
            proxy_host: self.proxy_host.or(fallback.proxy_host),
            proxy_port: self.proxy_port.or(fallback.proxy_port),
            message: self.message.or(fallback.message),
            verbosity: self.verbosity.or(fallback.verbosity),
            timeout: self.timeout.or(fallback.timeout),
        }
    }
}

impl SessionConfig {
    /// Apply defaults and validate. No network access happens here.
    pub fn from_settings(settings: SessionSettings) -> Result<Self, ConfigError> {
        let endpoint = settings
            .endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::MissingOption("endpoint"))?;
        validate_endpoint(&endpoint)?;

        let use_websocket = settings.use_websocket.unwrap_or(false);
        let auth = if use_websocket {
            let proxy = settings.proxy_host.map(|host| ProxySettings {
                host,
                port: settings.proxy_port.unwrap_or(DEFAULT_PROXY_PORT),
            });
            AuthMode::Websocket {
                signing_region: settings
                    .signing_region
                    .unwrap_or_else(|| DEFAULT_SIGNING_REGION.to_string()),
                proxy,
            }
        } else {
            if settings.proxy_host.is_some() {
                return Err(ConfigError::InvalidConfig(
                    "proxy_host is only supported together with use_websocket".to_string(),
                ));
            }
            AuthMode::MutualTls {
                cert: settings.cert.ok_or(ConfigError::MissingOption("cert"))?,
                key: settings.key.ok_or(ConfigError::MissingOption("key"))?,
            }
        };

        let port = settings.port.unwrap_or(match auth {
            AuthMode::MutualTls { .. } => DEFAULT_MTLS_PORT,
            AuthMode::Websocket { .. } => DEFAULT_WEBSOCKET_PORT,
        });

        let client_id = settings.client_id.unwrap_or_else(generate_client_id);
        validate_client_id(&client_id)?;

        let topic = settings
            .topic
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        validate_topic(&topic)?;

        let count = settings.count.unwrap_or(DEFAULT_COUNT);
        let timeout_secs = settings
            .timeout
            .unwrap_or_else(|| default_timeout_secs(count));
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeout must be at least one second".to_string(),
            ));
        }
        if timeout_secs < u64::from(count) {
            return Err(ConfigError::InvalidConfig(format!(
                "timeout of {timeout_secs}s is shorter than the {count}s publish window"
            )));
        }

        Ok(SessionConfig {
            endpoint,
            port,
            ca_file: settings.ca_file,
            auth,
            client_id,
            topic,
            count,
            message: settings
                .message
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            verbosity: settings.verbosity.unwrap_or_default(),
            timeout: Duration::from_secs(timeout_secs),
            keep_alive: Duration::from_secs(KEEP_ALIVE_SECS),
            clean_session: false,
        })
    }

    pub fn uses_websocket(&self) -> bool {
        matches!(self.auth, AuthMode::Websocket { .. })
    }
}

/// Random client id of the form `test-<n>` to avoid broker-side collisions
pub fn generate_client_id() -> String {
    let n = rand::thread_rng().gen_range(0..CLIENT_ID_RANGE);
    format!("test-{n}")
}

/// The session timeout when none is configured: one minute, stretched for
/// sessions whose publish window alone would not fit.
pub fn default_timeout_secs(count: u32) -> u64 {
    DEFAULT_TIMEOUT_SECS.max(u64::from(count) + TIMEOUT_GRACE_SECS)
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidEndpoint(endpoint.to_string());

    if endpoint.contains("://") || endpoint.contains('/') {
        return Err(invalid());
    }

    let url = Url::parse(&format!("mqtts://{endpoint}")).map_err(|_| invalid())?;
    if url.host_str().is_none() || url.port().is_some() || !url.username().is_empty() {
        return Err(invalid());
    }

    Ok(())
}

fn validate_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() || topic.contains(['+', '#', '\0']) {
        return Err(ConfigError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    if client_id.is_empty() || client_id.starts_with(char::is_whitespace) {
        return Err(ConfigError::InvalidClientId(client_id.to_string()));
    }
    Ok(())
}
