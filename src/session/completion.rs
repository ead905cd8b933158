//! One-shot completion signal shared by the tasks of a session

use crate::error::{SessionError, SessionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// Constructor for a linked [`CompletionHandle`] / [`CompletionWaiter`] pair
pub struct CompletionSignal;

impl CompletionSignal {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (CompletionHandle, CompletionWaiter) {
        let (tx, rx) = oneshot::channel();
        (
            CompletionHandle {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            CompletionWaiter { receiver: rx },
        )
    }
}

/// Resolves the session; only the first resolution counts
#[derive(Clone)]
pub struct CompletionHandle {
    sender: Arc<Mutex<Option<oneshot::Sender<SessionResult<()>>>>>,
}

impl CompletionHandle {
    pub async fn succeed(&self) -> bool {
        self.resolve(Ok(())).await
    }

    pub async fn fail(&self, error: SessionError) -> bool {
        self.resolve(Err(error)).await
    }

    /// Returns false when the signal was already resolved; the outcome is
    /// then discarded
    pub async fn resolve(&self, outcome: SessionResult<()>) -> bool {
        let Some(sender) = self.sender.lock().await.take() else {
            debug!(?outcome, "Completion already resolved, ignoring");
            return false;
        };

        // The waiter may have given up already; nothing else to tell
        let _ = sender.send(outcome);
        true
    }

    pub async fn is_resolved(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

/// Awaits the outcome of the session
pub struct CompletionWaiter {
    receiver: oneshot::Receiver<SessionResult<()>>,
}

impl CompletionWaiter {
    /// Wait up to `timeout`; expiry fails the session with
    /// [`SessionError::Timeout`]
    pub async fn wait(self, timeout: Duration) -> SessionResult<()> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SessionError::connection(
                "completion handles dropped before the session resolved",
            )),
            Err(_) => Err(SessionError::Timeout(timeout)),
        }
    }
}
