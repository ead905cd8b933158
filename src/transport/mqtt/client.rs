//! Impure I/O operations for the MQTT connection
//!
//! This module drives the `rumqttc` event loop, waits for broker
//! acknowledgements and forwards inbound messages to subscribers.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::SessionConfig;
use crate::transport::{Connection, InboundMessage};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, EventLoop, MqttOptions, QoS, SubscribeReasonCode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `connect` waits for CONNACK
pub const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);
/// How long `subscribe` waits for SUBACK
pub const SUBACK_TIMEOUT: Duration = Duration::from_secs(10);
/// How long `disconnect` waits for the event loop to flush DISCONNECT
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

const REQUEST_CHANNEL_CAPACITY: usize = 10;

type SubAckWaiters = Arc<Mutex<VecDeque<oneshot::Sender<Vec<SubscribeReasonCode>>>>>;

#[derive(Debug)]
struct Subscription {
    topic: String,
    qos: QoS,
    sender: mpsc::Sender<InboundMessage>,
}

/// MQTT connection to the broker
pub struct MqttConnection {
    client_id: String,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    closing: Arc<AtomicBool>,
    reconnect_config: ReconnectConfig,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    pending_subacks: SubAckWaiters,
}

impl MqttConnection {
    /// Build the connection for a session; nothing touches the network
    /// until [`MqttConnection::connect`]
    pub async fn new(config: &SessionConfig) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config).await?;
        Ok(Self::with_options(mqtt_options))
    }

    pub fn with_options(mqtt_options: MqttOptions) -> Self {
        let client_id = mqtt_options.client_id();
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) =
            watch::channel(ConnectionState::Disconnected("Not connected".to_string()));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            client_id,
            client,
            event_loop: Mutex::new(Some(event_loop)),
            event_loop_handle: Mutex::new(None),
            state_tx,
            state_rx,
            shutdown_tx,
            closing: Arc::new(AtomicBool::new(false)),
            reconnect_config: ReconnectConfig::default(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            pending_subacks: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Start the event loop and wait for CONNACK
    pub async fn connect(&self) -> Result<(), MqttError> {
        let event_loop = self.event_loop.lock().await.take().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Event loop already started".to_string())
        })?;

        let state_rx = self.state_tx.subscribe();
        let _ = self.state_tx.send(ConnectionState::Connecting);

        let context = EventLoopContext {
            client_id: self.client_id.clone(),
            client: self.client.clone(),
            state_tx: self.state_tx.clone(),
            closing: self.closing.clone(),
            reconnect_config: self.reconnect_config.clone(),
            subscriptions: self.subscriptions.clone(),
            pending_subacks: self.pending_subacks.clone(),
        };

        info!(client_id = %self.client_id, "Connecting to MQTT broker");
        let handle = tokio::spawn(run_event_loop(
            event_loop,
            context,
            self.shutdown_tx.subscribe(),
        ));
        *self.event_loop_handle.lock().await = Some(handle);

        wait_for_connection_confirmation(state_rx, CONNACK_TIMEOUT).await
    }

    /// Subscribe to `topic` and wait for SUBACK
    pub async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        sender: mpsc::Sender<InboundMessage>,
    ) -> Result<(), MqttError> {
        let current_state = self.connection_state();
        if !HealthMonitor::can_subscribe(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        info!("Subscribing to topic: {}", topic);

        // Registered before the request goes out so early deliveries are kept
        let (ack_tx, ack_rx) = oneshot::channel();
        self.subscriptions.lock().await.push(Subscription {
            topic: topic.to_string(),
            qos,
            sender,
        });
        self.pending_subacks.lock().await.push_back(ack_tx);

        let result = self.await_subscription(topic, qos, ack_rx).await;
        if result.is_err() {
            self.subscriptions
                .lock()
                .await
                .retain(|subscription| subscription.topic != topic);
        } else {
            info!("Successfully subscribed to: {}", topic);
        }
        result
    }

    async fn await_subscription(
        &self,
        topic: &str,
        qos: QoS,
        ack_rx: oneshot::Receiver<Vec<SubscribeReasonCode>>,
    ) -> Result<(), MqttError> {
        self.client.subscribe(topic, qos).await.map_err(|e| {
            MqttError::SubscriptionFailed(format!("Failed to subscribe to {topic}: {e}").into())
        })?;

        let return_codes = match tokio::time::timeout(SUBACK_TIMEOUT, ack_rx).await {
            Ok(Ok(return_codes)) => return_codes,
            Ok(Err(_)) => {
                return Err(MqttError::ConnectionFailedStr(
                    "Connection closed before SubAck".to_string(),
                ))
            }
            Err(_) => {
                return Err(MqttError::SubscriptionFailed(
                    format!("SubAck timeout for {topic}").into(),
                ))
            }
        };

        MessageHandler::validate_subscription(topic, &return_codes)
    }

    /// Hand a publish to the client
    pub async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", "Published to {}", topic);
        Ok(())
    }

    /// Send DISCONNECT and stop the event loop, forcing it down after
    /// [`DISCONNECT_TIMEOUT`]
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        let Some(mut handle) = self.event_loop_handle.lock().await.take() else {
            debug!("Disconnect requested before connect");
            let _ = self.state_tx.send(HealthMonitor::determine_next_state(
                &self.connection_state(),
                ConnectionEvent::Closed,
            ));
            return Ok(());
        };

        self.closing.store(true, Ordering::SeqCst);

        // Nothing to flush when the broker is not reachable
        if !matches!(self.connection_state(), ConnectionState::Connected) {
            let _ = self.shutdown_tx.send(true);
        }

        let graceful_shutdown = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            if let Err(e) = self.client.disconnect().await {
                debug!("DISCONNECT not queued: {}", e);
            }
            (&mut handle).await
        })
        .await;

        match graceful_shutdown {
            Ok(Ok(())) => {
                info!("Event loop task shut down gracefully");
            }
            Ok(Err(e)) if !e.is_cancelled() => {
                warn!("Event loop task ended with error: {}", e);
            }
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, forcing abort");
                let _ = self.shutdown_tx.send(true);
                handle.abort();
            }
            _ => {}
        }

        let _ = self.state_tx.send(HealthMonitor::determine_next_state(
            &self.connection_state(),
            ConnectionEvent::Closed,
        ));
        info!("MQTT client disconnected");
        Ok(())
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let current_state = self.connection_state();
        if !HealthMonitor::can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MqttConnection {
    type Error = MqttError;

    async fn connect(&self) -> Result<(), Self::Error> {
        MqttConnection::connect(self).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        sender: mpsc::Sender<InboundMessage>,
    ) -> Result<(), Self::Error> {
        MqttConnection::subscribe(self, topic, qos, sender).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), Self::Error> {
        MqttConnection::publish(self, topic, payload, qos).await
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        MqttConnection::disconnect(self).await
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), ConnectionState::Connected)
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);

        // disconnect() is async; dropping only stops the background task
        if let Some(handle) = self.event_loop_handle.get_mut().take() {
            handle.abort();
        }
    }
}

/// Everything the event loop task shares with [`MqttConnection`]
struct EventLoopContext {
    client_id: String,
    client: AsyncClient,
    state_tx: watch::Sender<ConnectionState>,
    closing: Arc<AtomicBool>,
    reconnect_config: ReconnectConfig,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    pending_subacks: SubAckWaiters,
}

impl EventLoopContext {
    fn transition(&self, event: ConnectionEvent) {
        let current_state = self.state_tx.borrow().clone();
        let _ = self
            .state_tx
            .send(HealthMonitor::determine_next_state(&current_state, event));
    }

    /// Returns true to keep polling, false to stop the loop
    async fn process_event_route(
        &self,
        route: EventRoute,
        reconnect_attempts: &mut u32,
        ever_connected: &mut bool,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged { session_present } => {
                self.transition(ConnectionEvent::ConnAckReceived);
                *reconnect_attempts = 0;
                if *ever_connected && !session_present {
                    self.resubscribe().await;
                }
                *ever_connected = true;
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                if MessageHandler::should_forward(&topic, retain) {
                    self.forward(topic, payload).await;
                }
                true
            }
            EventRoute::SubscriptionAcknowledged { return_codes } => {
                let mut pending = self.pending_subacks.lock().await;
                // Waiters whose subscribe call already gave up are skipped
                while pending.front().is_some_and(|waiter| waiter.is_closed()) {
                    pending.pop_front();
                }
                match pending.pop_front() {
                    Some(waiter) => {
                        let _ = waiter.send(return_codes);
                    }
                    None => {
                        debug!(target: "mqtt_transport", "Resubscription confirmed: {:?}", return_codes);
                    }
                }
                true
            }
            EventRoute::Disconnected => {
                if self.closing.load(Ordering::SeqCst) {
                    return false;
                }
                self.transition(ConnectionEvent::NetworkError(
                    "Broker closed the connection".to_string(),
                ));
                self.attempt_reconnection(reconnect_attempts, shutdown_rx)
                    .await
            }
            EventRoute::DisconnectSent => {
                debug!(target: "mqtt_transport", "DISCONNECT sent");
                !self.closing.load(Ordering::SeqCst)
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Returns true to poll again (which reconnects), false to stop the loop
    async fn handle_event_loop_error(
        &self,
        error: ConnectionError,
        ever_connected: bool,
        reconnect_attempts: &mut u32,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        if self.closing.load(Ordering::SeqCst) {
            debug!("Event loop error while closing: {}", error);
            return false;
        }

        error!(client_id = %self.client_id, "MQTT event loop error: {}", error);
        self.transition(ConnectionEvent::NetworkError(error.to_string()));

        // A failed initial connect is reported by connect(), not retried
        if !ever_connected {
            return false;
        }

        self.attempt_reconnection(reconnect_attempts, shutdown_rx)
            .await
    }

    async fn attempt_reconnection(
        &self,
        reconnect_attempts: &mut u32,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        let decision = HealthMonitor::should_attempt_reconnection(
            *reconnect_attempts,
            &self.reconnect_config,
            *shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                *reconnect_attempts = attempt;
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));

                let max_display = self
                    .reconnect_config
                    .max_attempts
                    .map_or("∞".to_string(), |max| max.to_string());
                info!(
                    "Attempting reconnection {}/{} after {}ms delay",
                    attempt, max_display, delay_ms
                );

                interruptible_sleep(shutdown_rx, delay_ms).await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = format!(
                    "Max reconnection attempts ({}) exceeded",
                    *reconnect_attempts
                );
                self.transition(ConnectionEvent::PermanentFailure(reason));
                false
            }
        }
    }

    async fn forward(&self, topic: String, payload: Vec<u8>) {
        let subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.iter().filter(|s| s.topic == topic) {
            let message = InboundMessage {
                topic: topic.clone(),
                payload: payload.clone(),
            };
            if subscription.sender.send(message).await.is_err() {
                debug!("Subscriber for {} is gone, dropping message", topic);
            }
        }
    }

    async fn resubscribe(&self) {
        let subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.iter() {
            if let Err(e) = self
                .client
                .try_subscribe(subscription.topic.as_str(), subscription.qos)
            {
                error!("Failed to re-subscribe to {}: {}", subscription.topic, e);
            } else {
                debug!(target: "mqtt_transport", "Re-subscribed to: {}", subscription.topic);
            }
        }
    }

    /// Drop every subscriber channel so listeners observe the closed connection
    async fn close_subscriptions(&self) {
        self.subscriptions.lock().await.clear();
        self.pending_subacks.lock().await.clear();
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    context: EventLoopContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(client_id = %context.client_id, "Starting MQTT event loop");
    let mut reconnect_attempts = 0u32;
    let mut ever_connected = false;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received, stopping event loop");
                    break;
                }
            }

            event_result = event_loop.poll() => {
                let keep_polling = match event_result {
                    Ok(event) => {
                        let route = MessageHandler::route_mqtt_event(&event);
                        context
                            .process_event_route(
                                route,
                                &mut reconnect_attempts,
                                &mut ever_connected,
                                shutdown_rx.clone(),
                            )
                            .await
                    }
                    Err(e) => {
                        context
                            .handle_event_loop_error(
                                e,
                                ever_connected,
                                &mut reconnect_attempts,
                                shutdown_rx.clone(),
                            )
                            .await
                    }
                };
                if !keep_polling {
                    break;
                }
            }
        }
    }

    context.close_subscriptions().await;
    info!(client_id = %context.client_id, "MQTT event loop stopped");
}

/// Wait until the state reaches Connected, failing on any disconnect or
/// after `timeout`
async fn wait_for_connection_confirmation(
    mut state_rx: watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<(), MqttError> {
    let timeout_result = tokio::time::timeout(timeout, async {
        loop {
            if state_rx.changed().await.is_err() {
                return Err(MqttError::ConnectionFailedStr(
                    "State channel closed".to_string(),
                ));
            }
            match *state_rx.borrow() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected(ref reason) => {
                    return Err(MqttError::ConnectionFailedStr(reason.clone()));
                }
                ConnectionState::PermanentlyDisconnected(ref reason) => {
                    return Err(MqttError::ConnectionFailedStr(format!(
                        "Permanently disconnected: {reason}"
                    )));
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting(_) => continue,
            }
        }
    })
    .await;

    match timeout_result {
        Ok(result) => result,
        Err(_) => Err(MqttError::ConnectionFailedStr(
            "ConnAck timeout - no connection confirmation received".to_string(),
        )),
    }
}

/// Returns true if the sleep completed, false if shutdown was requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
    }
}
