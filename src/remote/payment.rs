//! Payment notifications from billable remote calls.
//!
//! The client publishes one event per billable call onto a broadcast channel,
//! decoupled from the synchronous call path. Delivery is at-least-once;
//! consumers forward events as user-visible notices.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the payment broadcast channel.
const PAYMENT_CHANNEL_CAPACITY: usize = 64;

/// A billable remote call was made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Account that was charged.
    pub account_id: String,
    /// Which service billed the call ("image" or "filestore").
    pub service: String,
    /// The tool that was invoked.
    pub tool: String,
    /// Amount charged, when the service reports one.
    pub amount: Option<Decimal>,
    /// Currency code, when the service reports one.
    pub currency: Option<String>,
    /// When the call completed.
    pub at: DateTime<Utc>,
}

/// Create the payment event channel.
pub fn payment_channel() -> (
    broadcast::Sender<PaymentEvent>,
    broadcast::Receiver<PaymentEvent>,
) {
    broadcast::channel(PAYMENT_CHANNEL_CAPACITY)
}
