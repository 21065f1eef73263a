//! Poll scheduling capability.
//!
//! The lifecycle manager requests "poll task X after delay D" through the
//! [`PollScheduler`] trait rather than sleeping inline, so unit tests can
//! inject a recording scheduler instead of waiting in real time. Delays are
//! measured from "now" at the moment of scheduling.

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Deferred-call contract: invoke a poll attempt for `task_id` after `delay`.
pub trait PollScheduler: Send + Sync {
    fn schedule_poll(&self, delay: Duration, task_id: Uuid);
}

/// Production scheduler: each request becomes a spawned sleep that feeds the
/// task id back into the poll pump channel.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl TokioScheduler {
    /// Create the scheduler and the receiving end of the poll pump.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PollScheduler for TokioScheduler {
    fn schedule_poll(&self, delay: Duration, task_id: Uuid) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the agent is shutting down.
            let _ = tx.send(task_id);
        });
    }
}
