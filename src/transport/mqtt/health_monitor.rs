//! Pure reconnection decisions and state transitions for the MQTT connection

use super::connection::{ConnectionState, ReconnectConfig};
use tracing::{error, info, warn};

/// Events that move the connection between states
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    ConnAckReceived,
    NetworkError(String),
    ReconnectionStarted(u32),
    PermanentFailure(String),
    Closed,
}

/// Outcome of a reconnection decision
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    /// Retry after the given delay
    Proceed { attempt: u32, delay_ms: u64 },
    /// Stop, the client is shutting down
    AbortShutdownRequested,
    /// Stop, attempts exhausted
    AbortMaxAttemptsExceeded,
}

pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide whether to retry after `current_attempts` consecutive failures
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay_ms: config.calculate_backoff_delay(current_attempts + 1),
        }
    }

    /// Next state after a connection event, logging the transition
    pub fn determine_next_state(
        current_state: &ConnectionState,
        event: ConnectionEvent,
    ) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => {
                if matches!(current_state, ConnectionState::Reconnecting(_)) {
                    info!("MQTT reconnection successful");
                } else {
                    info!("MQTT connection established");
                }
                ConnectionState::Connected
            }
            ConnectionEvent::NetworkError(reason) => {
                warn!("MQTT connection error: {}", reason);
                ConnectionState::Disconnected(reason)
            }
            ConnectionEvent::ReconnectionStarted(attempt) => {
                info!("Starting reconnection attempt {}", attempt);
                ConnectionState::Reconnecting(attempt)
            }
            ConnectionEvent::PermanentFailure(reason) => {
                error!("MQTT connection permanently failed: {}", reason);
                ConnectionState::PermanentlyDisconnected(reason)
            }
            ConnectionEvent::Closed => ConnectionState::Disconnected("Client disconnected".to_string()),
        }
    }

    /// Publishes are queued by the client while a reconnection is underway
    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(
            state,
            ConnectionState::Connected | ConnectionState::Reconnecting(_)
        )
    }

    pub fn can_subscribe(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnection_proceeds_with_backoff() {
        let config = ReconnectConfig::default();

        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay_ms: 250
            }
        );
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(2, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 3,
                delay_ms: 1000
            }
        );
    }

    #[test]
    fn test_reconnection_stops_after_max_attempts() {
        let config = ReconnectConfig::default();
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(3, &config, false),
            ReconnectionDecision::AbortMaxAttemptsExceeded
        );
    }

    #[test]
    fn test_shutdown_wins_over_retry() {
        let config = ReconnectConfig::default();
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &config, true),
            ReconnectionDecision::AbortShutdownRequested
        );
    }

    #[test]
    fn test_unlimited_retries() {
        let config = ReconnectConfig {
            max_attempts: None,
            ..Default::default()
        };
        assert!(matches!(
            HealthMonitor::should_attempt_reconnection(1_000, &config, false),
            ReconnectionDecision::Proceed { attempt: 1_001, .. }
        ));
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            HealthMonitor::determine_next_state(
                &ConnectionState::Connecting,
                ConnectionEvent::ConnAckReceived
            ),
            ConnectionState::Connected
        );
        assert_eq!(
            HealthMonitor::determine_next_state(
                &ConnectionState::Connected,
                ConnectionEvent::ReconnectionStarted(2)
            ),
            ConnectionState::Reconnecting(2)
        );
        assert!(matches!(
            HealthMonitor::determine_next_state(
                &ConnectionState::Reconnecting(3),
                ConnectionEvent::PermanentFailure("gone".to_string())
            ),
            ConnectionState::PermanentlyDisconnected(_)
        ));
    }

    #[test]
    fn test_request_gates() {
        assert!(HealthMonitor::can_publish(&ConnectionState::Connected));
        assert!(HealthMonitor::can_publish(&ConnectionState::Reconnecting(1)));
        assert!(!HealthMonitor::can_publish(&ConnectionState::Connecting));
        assert!(!HealthMonitor::can_publish(
            &ConnectionState::PermanentlyDisconnected("x".to_string())
        ));

        assert!(HealthMonitor::can_subscribe(&ConnectionState::Connected));
        assert!(!HealthMonitor::can_subscribe(&ConnectionState::Reconnecting(1)));
    }
}
