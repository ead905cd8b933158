//! Command-line surface of the `pub-sub` binary

use crate::config::{ConfigError, SessionConfig, SessionSettings, Verbosity};
use clap::Parser;
use std::path::PathBuf;

/// Connect to an MQTT broker, publish a numbered series of JSON messages to a
/// topic and exit once the last one is echoed back by the broker
#[derive(Debug, Parser)]
#[command(name = "pub-sub")]
#[command(version)]
pub struct Cli {
    /// Broker endpoint host name (required, here or in the config file)
    #[arg(short = 'e', long, env = "IOT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Broker port [default: 8883, or 443 with --use_websocket]
    #[arg(long)]
    pub port: Option<u16>,

    /// Certificate authority file overriding the platform trust store
    #[arg(short = 'r', long = "ca_file", visible_alias = "ca-file", value_name = "FILE")]
    pub ca_file: Option<PathBuf>,

    /// Client certificate (PEM), required unless --use_websocket
    #[arg(short = 'c', long, value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Client private key (PEM), required unless --use_websocket
    #[arg(short = 'k', long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Client id [default: test-<random number>]
    #[arg(short = 'C', long = "client_id", visible_alias = "client-id")]
    pub client_id: Option<String>,

    /// Topic to subscribe and publish to [default: test/topic]
    #[arg(short = 't', long)]
    pub topic: Option<String>,

    /// Number of messages to publish [default: 10]
    #[arg(short = 'n', long)]
    pub count: Option<u32>,

    /// Connect over a SigV4-signed websocket instead of raw MQTT over mutual TLS.
    /// `--use_websocket=false` overrides a config file that enables it.
    #[arg(
        short = 'W',
        long = "use_websocket",
        visible_alias = "use-websocket",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub use_websocket: Option<bool>,

    /// Region used to compute the SigV4 signature [default: us-east-1]
    #[arg(short = 's', long = "signing_region", visible_alias = "signing-region")]
    pub signing_region: Option<String>,

    /// HTTP proxy host for websocket connections. You will likely need
    /// --ca_file pointing at the proxy's CA as well.
    #[arg(short = 'H', long = "proxy_host", visible_alias = "proxy-host")]
    pub proxy_host: Option<String>,

    /// HTTP proxy port [default: 8080]
    #[arg(short = 'P', long = "proxy_port", visible_alias = "proxy-port")]
    pub proxy_port: Option<u16>,

    /// Message text to publish [default: "Hello world!"]
    #[arg(short = 'M', long)]
    pub message: Option<String>,

    /// MQTT client library log level [default: none]
    #[arg(short = 'v', long, value_enum)]
    pub verbosity: Option<Verbosity>,

    /// Fail the session if it has not completed after this many seconds
    /// [default: 60, longer for large counts]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// TOML file with defaults for any of the options above
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Settings given explicitly on the command line
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            endpoint: self.endpoint.clone(),
            port: self.port,
            ca_file: self.ca_file.clone(),
            cert: self.cert.clone(),
            key: self.key.clone(),
            client_id: self.client_id.clone(),
            topic: self.topic.clone(),
            count: self.count,
            use_websocket: self.use_websocket,
            signing_region: self.signing_region.clone(),
            proxy_host: self.proxy_host.clone(),
            proxy_port: self.proxy_port,
            message: self.message.clone(),
            verbosity: self.verbosity,
            timeout: self.timeout,
        }
    }

    /// Layer the command line over the `--config` file, then apply defaults
    /// and validate
    pub fn resolve(&self) -> Result<SessionConfig, ConfigError> {
        let settings = match &self.config {
            Some(path) => self.settings().or(SessionSettings::load_from_file(path)?),
            None => self.settings(),
        };
        SessionConfig::from_settings(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_aliases() {
        let cli = Cli::try_parse_from([
            "pub-sub", "-e", "broker.example.com", "-r", "ca.pem", "-c", "cert.pem", "-k",
            "key.pem", "-C", "device-1", "-t", "a/b", "-n", "3", "-M", "hi", "-v", "debug",
        ])
        .unwrap();

        let settings = cli.settings();
        assert_eq!(settings.endpoint.as_deref(), Some("broker.example.com"));
        assert_eq!(settings.ca_file, Some(PathBuf::from("ca.pem")));
        assert_eq!(settings.cert, Some(PathBuf::from("cert.pem")));
        assert_eq!(settings.key, Some(PathBuf::from("key.pem")));
        assert_eq!(settings.client_id.as_deref(), Some("device-1"));
        assert_eq!(settings.topic.as_deref(), Some("a/b"));
        assert_eq!(settings.count, Some(3));
        assert_eq!(settings.message.as_deref(), Some("hi"));
        assert_eq!(settings.verbosity, Some(Verbosity::Debug));
        assert_eq!(settings.use_websocket, None);
    }

    #[test]
    fn test_websocket_flags() {
        let cli = Cli::try_parse_from([
            "pub-sub",
            "--endpoint",
            "broker.example.com",
            "-W",
            "--signing_region",
            "eu-west-1",
            "-H",
            "proxy.local",
            "-P",
            "3128",
        ])
        .unwrap();

        let settings = cli.settings();
        assert_eq!(settings.use_websocket, Some(true));
        assert_eq!(settings.signing_region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.proxy_host.as_deref(), Some("proxy.local"));
        assert_eq!(settings.proxy_port, Some(3128));
    }

    #[test]
    fn test_websocket_flag_takes_explicit_value() {
        let cli = Cli::try_parse_from(["pub-sub", "-e", "broker", "--use_websocket=false"]).unwrap();
        assert_eq!(cli.settings().use_websocket, Some(false));

        let cli = Cli::try_parse_from(["pub-sub", "-e", "broker", "-W=true"]).unwrap();
        assert_eq!(cli.settings().use_websocket, Some(true));

        let cli = Cli::try_parse_from(["pub-sub", "-e", "broker"]).unwrap();
        assert_eq!(cli.settings().use_websocket, None);
    }

    #[test]
    fn test_negative_count_rejected() {
        let result = Cli::try_parse_from(["pub-sub", "-e", "broker", "-n", "-1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_verbosity_rejected() {
        let result = Cli::try_parse_from(["pub-sub", "-e", "broker", "-v", "loud"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_without_cert_fails_before_connecting() {
        let cli = Cli::try_parse_from(["pub-sub", "-e", "broker.example.com"]).unwrap();
        assert!(matches!(
            cli.resolve(),
            Err(ConfigError::MissingOption(_))
        ));
    }

    #[test]
    fn test_resolve_missing_config_file() {
        let cli = Cli::try_parse_from([
            "pub-sub",
            "-e",
            "broker.example.com",
            "--config",
            "/nonexistent/pub-sub.toml",
        ])
        .unwrap();
        assert!(matches!(cli.resolve(), Err(ConfigError::FileRead(_))));
    }

    #[test]
    fn test_kebab_case_aliases() {
        let cli = Cli::try_parse_from([
            "pub-sub",
            "-e",
            "broker",
            "--use-websocket",
            "--client-id",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.use_websocket, Some(true));
        assert_eq!(cli.client_id.as_deref(), Some("abc"));
    }
}
