//! Session execution: connect, subscribe, publish on a fixed schedule and wait
//! for the final echo

use super::completion::{CompletionHandle, CompletionSignal};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::protocol::EchoMessage;
use crate::transport::{Connection, InboundMessage, QoS};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Spacing between scheduled publishes
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Phases of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribing,
    PublishingListening,
    Terminating,
}

/// The part of the configuration the session protocol needs
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub topic: String,
    pub count: u32,
    pub message: String,
    pub timeout: Duration,
}

impl From<&SessionConfig> for SessionPlan {
    fn from(config: &SessionConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            count: config.count,
            message: config.message.clone(),
            timeout: config.timeout,
        }
    }
}

/// Counters reported once a session has succeeded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub published: u32,
    pub received: u32,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU32,
    received: AtomicU32,
}

impl Counters {
    fn summary(&self) -> SessionSummary {
        SessionSummary {
            published: self.published.load(Ordering::SeqCst),
            received: self.received.load(Ordering::SeqCst),
        }
    }
}

/// Drives one session over a [`Connection`]
pub struct SessionOrchestrator<C: Connection + 'static> {
    connection: Arc<C>,
    plan: SessionPlan,
    state: SessionState,
}

impl<C: Connection + 'static> SessionOrchestrator<C> {
    pub fn new(connection: C, plan: SessionPlan) -> Self {
        Self::with_shared_connection(Arc::new(connection), plan)
    }

    pub fn with_shared_connection(connection: Arc<C>, plan: SessionPlan) -> Self {
        Self {
            connection,
            plan,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Run the session to completion. Whatever the outcome, background tasks
    /// are stopped and the connection is closed before returning.
    pub async fn run(&mut self) -> SessionResult<SessionSummary> {
        let mut tasks = JoinSet::new();
        let counters = Arc::new(Counters::default());

        let outcome = self.execute(&mut tasks, &counters).await;

        self.transition(SessionState::Terminating);
        tasks.abort_all();
        if let Err(e) = self.connection.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }

        match outcome {
            Ok(()) => {
                let summary = counters.summary();
                info!(
                    published = summary.published,
                    received = summary.received,
                    "Session complete"
                );
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(
        &mut self,
        tasks: &mut JoinSet<()>,
        counters: &Arc<Counters>,
    ) -> SessionResult<()> {
        self.transition(SessionState::Connecting);
        self.connection
            .connect()
            .await
            .map_err(SessionError::connection)?;

        self.transition(SessionState::Subscribing);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        self.connection
            .subscribe(&self.plan.topic, QoS::AtLeastOnce, inbound_tx)
            .await
            .map_err(|e| SessionError::subscribe(self.plan.topic.clone(), e))?;

        if self.plan.count == 0 {
            info!("Nothing to publish, session complete after subscribe");
            return Ok(());
        }

        self.transition(SessionState::PublishingListening);
        let (completion, waiter) = CompletionSignal::new();

        tasks.spawn(listen(
            inbound_rx,
            self.plan.count,
            completion.clone(),
            counters.clone(),
        ));

        tasks.spawn(publish_on_schedule(
            self.connection.clone(),
            self.plan.clone(),
            completion,
            counters.clone(),
        ));

        waiter.wait(self.plan.timeout).await
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = ?self.state, to = ?next, "Session state transition");
        self.state = next;
    }
}

/// Publish sequence `n` at `start + (n - 1) * PUBLISH_INTERVAL`.
///
/// Offsets are absolute from the start, not chained on earlier publishes,
/// and each publish runs on its own task so a slow one never delays the next
/// deadline. Finished publishes are reaped at every tick.
async fn publish_on_schedule<C: Connection + 'static>(
    connection: Arc<C>,
    plan: SessionPlan,
    completion: CompletionHandle,
    counters: Arc<Counters>,
) {
    let start = Instant::now();
    let mut in_flight = JoinSet::new();

    for sequence in 1..=plan.count {
        tokio::time::sleep_until(start + PUBLISH_INTERVAL * (sequence - 1)).await;
        while in_flight.try_join_next().is_some() {}

        in_flight.spawn(publish(
            connection.clone(),
            plan.topic.clone(),
            EchoMessage::new(plan.message.clone(), sequence),
            completion.clone(),
            counters.clone(),
        ));
    }

    while in_flight.join_next().await.is_some() {}
}

async fn publish<C: Connection>(
    connection: Arc<C>,
    topic: String,
    message: EchoMessage,
    completion: CompletionHandle,
    counters: Arc<Counters>,
) {
    let sequence = message.sequence;
    let result = match message.encode() {
        Ok(payload) => connection
            .publish(&topic, payload, QoS::AtLeastOnce)
            .await
            .map_err(|e| SessionError::publish(sequence, e)),
        Err(e) => Err(SessionError::publish(sequence, e)),
    };

    match result {
        Ok(()) => {
            counters.published.fetch_add(1, Ordering::SeqCst);
            info!(sequence, topic = %topic, "Published message");
        }
        Err(e) => {
            completion.fail(e).await;
        }
    }
}

async fn listen(
    mut inbound: mpsc::Receiver<InboundMessage>,
    count: u32,
    completion: CompletionHandle,
    counters: Arc<Counters>,
) {
    while let Some(message) = inbound.recv().await {
        info!(
            topic = %message.topic,
            payload = %String::from_utf8_lossy(&message.payload),
            "Publish received"
        );

        match EchoMessage::decode(&message.payload) {
            Ok(echo) => {
                counters.received.fetch_add(1, Ordering::SeqCst);
                if echo.is_final(count) && !completion.succeed().await {
                    debug!(sequence = echo.sequence, "Duplicate final echo ignored");
                }
            }
            Err(e) => {
                completion.fail(SessionError::payload(message.topic, e)).await;
                return;
            }
        }
    }

    completion
        .fail(SessionError::ConnectionLost { expected: count })
        .await;
}
