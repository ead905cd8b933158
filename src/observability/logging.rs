//! Structured logging using the tracing crate
//!
//! ## Log Format Options
//!
//! The output format is controlled by the `LOG_FORMAT` environment variable:
//!
//! - `json` - Structured JSON, one event per line
//! - `pretty` - Multi-line, colored output for reading by hand
//! - `compact` - Colored single-line output (default)
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: Level of this crate's own events (ERROR, WARN, INFO, DEBUG, TRACE) - defaults to INFO
//! - `LOG_FORMAT`: Output format (json, pretty, compact) - defaults to compact
//! - `RUST_LOG`: Overrides all filtering, including `--verbosity`
//!
//! The MQTT client library logs through the `log` crate; those records are
//! bridged into tracing under the `rumqttc` target and filtered by
//! `--verbosity`, which defaults to `none`.
//!
//! ```bash
//! LOG_FORMAT=json pub-sub -e example-ats.iot.us-east-1.amazonaws.com -c cert.pem -k key.pem
//! LOG_LEVEL=DEBUG pub-sub -e ... -v debug
//! ```

use crate::config::Verbosity;
use std::env;
use tracing::Level;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Parse log format from string, falling back to compact
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Parse a `LOG_LEVEL` value, falling back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Filter level for the client library; there is no FATAL in tracing
pub fn verbosity_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Fatal | Verbosity::Error => "error",
        Verbosity::Warn => "warn",
        Verbosity::Info => "info",
        Verbosity::Debug => "debug",
        Verbosity::Trace => "trace",
        Verbosity::None => "off",
    }
}

/// Filter directives for the given application level and client verbosity
pub fn filter_directives(level: Level, verbosity: Verbosity) -> String {
    format!(
        "{},rumqttc={},tokio_rustls=warn,rustls=warn,tokio=warn",
        level.as_str().to_lowercase(),
        verbosity_directive(verbosity)
    )
}

/// Install the global subscriber
pub fn init_logging(
    level: Level,
    format: LogFormat,
    verbosity: Verbosity,
) -> Result<(), TryInitError> {
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(filter_directives(level, verbosity)),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().pretty().with_ansi(true))
            .try_init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_ansi(true).with_target(false))
            .try_init(),
    }
}

/// Initialize logging from `LOG_LEVEL` and `LOG_FORMAT`
pub fn init_default_logging(verbosity: Verbosity) -> Result<(), TryInitError> {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()));
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()));

    init_logging(level, format, verbosity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
    }

    #[test]
    fn test_log_format_parse_invalid_defaults_to_compact() {
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Compact);
    }

    #[test]
    fn test_parse_level() {
        let test_cases = vec![
            ("ERROR", Level::ERROR),
            ("warn", Level::WARN),
            ("INFO", Level::INFO),
            ("Debug", Level::DEBUG),
            ("TRACE", Level::TRACE),
            ("invalid", Level::INFO),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_level(input), expected, "Failed for input: {input}");
        }
    }

    #[test]
    fn test_verbosity_directive() {
        assert_eq!(verbosity_directive(Verbosity::None), "off");
        assert_eq!(verbosity_directive(Verbosity::Fatal), "error");
        assert_eq!(verbosity_directive(Verbosity::Error), "error");
        assert_eq!(verbosity_directive(Verbosity::Warn), "warn");
        assert_eq!(verbosity_directive(Verbosity::Info), "info");
        assert_eq!(verbosity_directive(Verbosity::Debug), "debug");
        assert_eq!(verbosity_directive(Verbosity::Trace), "trace");
    }

    #[test]
    fn test_filter_directives_silence_client_by_default() {
        let directives = filter_directives(Level::INFO, Verbosity::default());
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("rumqttc=off"));
    }

    #[test]
    fn test_filter_directives_parse() {
        for verbosity in [Verbosity::Fatal, Verbosity::Trace, Verbosity::None] {
            let directives = filter_directives(Level::DEBUG, verbosity);
            assert!(EnvFilter::try_new(&directives).is_ok(), "{directives}");
        }
    }
}
