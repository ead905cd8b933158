//! The pub/sub echo session
//!
//! A session connects, subscribes to one topic, publishes `count` numbered
//! messages one second apart and succeeds once the last one comes back.

pub mod completion;
pub mod orchestrator;

pub use completion::{CompletionHandle, CompletionSignal, CompletionWaiter};
pub use orchestrator::{
    SessionOrchestrator, SessionPlan, SessionState, SessionSummary, PUBLISH_INTERVAL,
};
