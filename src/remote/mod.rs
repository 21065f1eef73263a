//! Remote job client — capability wrapper over the external MCP services.

pub mod client;
pub mod payment;

pub use client::{JobClient, JobStatus, McpJobClient, StoredObject};
pub use payment::{payment_channel, PaymentEvent};
