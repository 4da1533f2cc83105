//! Billing handlers.
//!
//! ## Commands
//! - Processing billing webhooks end to end
//! - Purging expired idempotency records
//!
//! ## Queries
//! - Get an account's subscription snapshot

mod get_subscription_snapshot;
mod handle_billing_webhook;
mod purge_idempotency_records;

// Commands
pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, WebhookOutcome,
};
pub use purge_idempotency_records::{
    PurgeIdempotencyRecordsCommand, PurgeIdempotencyRecordsHandler,
};

// Queries
pub use get_subscription_snapshot::{
    GetSubscriptionSnapshotHandler, GetSubscriptionSnapshotQuery, GetSubscriptionSnapshotResult,
};
