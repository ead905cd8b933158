//! pub-sub - MQTT publish/subscribe echo session

use clap::Parser;
use iot_pubsub::cli::Cli;
use iot_pubsub::config::{SessionConfig, Verbosity};
use iot_pubsub::error::SessionResult;
use iot_pubsub::observability::init_default_logging;
use iot_pubsub::session::{SessionOrchestrator, SessionPlan, SessionSummary};
use iot_pubsub::transport::mqtt::MqttConnection;
use iot_pubsub::SessionError;
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> SessionResult<SessionSummary> {
    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from the session config, fall back to defaults
            init_logging_or_warn(Verbosity::None);
            return Err(e.into());
        }
    };

    init_logging_or_warn(config.verbosity);

    info!(
        "Starting pub-sub v{} as client {}",
        env!("CARGO_PKG_VERSION"),
        config.client_id
    );

    run_session(&config).await
}

async fn run_session(config: &SessionConfig) -> SessionResult<SessionSummary> {
    info!(
        endpoint = %config.endpoint,
        port = config.port,
        websocket = config.uses_websocket(),
        "Connecting"
    );

    let connection = MqttConnection::new(config)
        .await
        .map_err(SessionError::connection)?;
    let mut orchestrator = SessionOrchestrator::new(connection, SessionPlan::from(config));
    orchestrator.run().await
}

fn init_logging_or_warn(verbosity: Verbosity) {
    if let Err(e) = init_default_logging(verbosity) {
        eprintln!("Failed to initialize logging: {e}");
    }
}
