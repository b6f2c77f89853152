/// Notification delivery.
///
/// Events carry an idempotency key; the webhook dispatcher claims each
/// (event, channel) pair in the delivery ledger before any request leaves
/// the process.
pub mod events;
pub mod webhook;

pub use events::{StatusEvent, test_event};
pub use webhook::{DispatchStatus, FanoutSummary, WebhookDispatcher};
