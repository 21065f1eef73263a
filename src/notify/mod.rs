//! Notification sink — structured event broadcast plus the durable
//! conversation log.
//!
//! Both halves are best-effort: broadcast with no receivers is fine, and a
//! log-append failure is swallowed after a warning. Lifecycle progress is
//! never blocked by notification delivery.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::remote::PaymentEvent;
use crate::store::Database;
use crate::task::model::TaskRecord;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Role used for agent-authored conversation log entries.
pub const AGENT_ROLE: &str = "agent";

/// Structured events delivered to connected observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Full task snapshot (sent to WebSocket clients on connect and resync).
    TasksSync { tasks: Vec<TaskRecord> },
    /// A generation task was accepted by the remote service.
    TaskStarted { task: TaskRecord },
    /// The remote job is still running.
    TaskProgress { id: Uuid },
    /// A transient remote failure; the poll will be retried.
    TaskRetrying { id: Uuid, reason: String },
    /// Terminal success. `degraded` is set when the best-effort copy into
    /// durable storage failed and the original URL is being served.
    TaskCompleted { task: TaskRecord, degraded: bool },
    /// Terminal failure reported by the remote job.
    TaskFailed { id: Uuid },
    /// A billable remote call was charged to the account.
    Payment {
        service: String,
        tool: String,
        amount: Option<Decimal>,
        currency: Option<String>,
    },
}

/// Broadcasts events to observers and appends messages to the conversation log.
pub struct Notifier {
    tx: broadcast::Sender<AgentEvent>,
    store: Arc<dyn Database>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Database>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self { tx, store })
    }

    /// Subscribe to real-time events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget delivery to zero or more observers.
    pub fn broadcast(&self, event: AgentEvent) {
        // Ok if no receivers are listening.
        let _ = self.tx.send(event);
    }

    /// Append an agent message to the durable conversation log.
    /// Failure is swallowed so lifecycle progress is never blocked by logging.
    pub async fn append_message(&self, text: &str) {
        if let Err(e) = self.store.append_chat_message(AGENT_ROLE, text).await {
            warn!(error = %e, "Failed to append message to conversation log");
        }
    }

    /// Broadcast an event and append its human-readable form in one step.
    pub async fn announce(&self, event: AgentEvent, text: &str) {
        self.broadcast(event);
        self.append_message(text).await;
    }
}

/// Forward payment events from the remote client as broadcast events and
/// conversation log lines. At-least-once; duplicates are acceptable.
pub fn spawn_payment_forwarder(
    notifier: Arc<Notifier>,
    mut rx: broadcast::Receiver<PaymentEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(payment) => {
                    let text = match (&payment.amount, &payment.currency) {
                        (Some(amount), Some(currency)) => format!(
                            "💸 Paid {amount} {currency} to the {} service",
                            payment.service
                        ),
                        _ => format!("💸 Billable call to the {} service", payment.service),
                    };
                    info!(
                        service = %payment.service,
                        tool = %payment.tool,
                        "Payment notification"
                    );
                    notifier
                        .announce(
                            AgentEvent::Payment {
                                service: payment.service,
                                tool: payment.tool,
                                amount: payment.amount,
                                currency: payment.currency,
                            },
                            &text,
                        )
                        .await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Payment forwarder lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
