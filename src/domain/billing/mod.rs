//! Billing module - Webhook verification, normalization and reconciliation.
//!
//! Events flow through this module in a fixed order:
//!
//! 1. `EventVerifier` authenticates the raw delivery and parses the envelope
//! 2. `normalize` maps the provider envelope onto a `BillingEvent`
//! 3. `ReconciliationEngine` folds the event into the account's
//!    `SubscriptionSnapshot`
//!
//! The idempotency gate sits between steps 2 and 3 and lives in the
//! application layer, since it spans the ledger and the engine.

mod billing_event;
mod errors;
mod normalizer;
mod provider_event;
mod reconciler;
mod snapshot;
mod status;
mod verifier;

pub use billing_event::{
    BillingEvent, BillingEventKind, InvoiceRef, PaymentRef, SubscriptionDeletion,
    SubscriptionState,
};
pub use errors::{
    NormalizationError, NormalizationReason, ReconciliationError, VerificationError,
    VerificationReason, WebhookError,
};
pub use normalizer::{normalize, subscription_state};
pub use provider_event::{ProviderEvent, ProviderEventData};
pub use reconciler::{ReconciliationEngine, ReconciliationResult, RetryPolicy};
pub use snapshot::{SubscriptionSnapshot, VersionedSnapshot};
pub use status::SubscriptionStatus;
pub use verifier::{EventVerifier, SignatureHeader, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub use provider_event::ProviderEventBuilder;
#[cfg(test)]
pub use verifier::compute_test_signature;
