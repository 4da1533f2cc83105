//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;

pub use billing::{
    GetSubscriptionSnapshotHandler, GetSubscriptionSnapshotQuery, GetSubscriptionSnapshotResult,
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, PurgeIdempotencyRecordsCommand,
    PurgeIdempotencyRecordsHandler, WebhookOutcome,
};
