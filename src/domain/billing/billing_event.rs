//! Normalized billing events.
//!
//! A `BillingEvent` is built once per delivery by the normalizer and dropped
//! after processing. The kind and the provider fields it needs travel
//! together in one tagged enum, so every handler sees exactly the data its
//! kind carries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::foundation::{CustomerId, EventId, SubscriptionId};

use super::status::SubscriptionStatus;

/// Full provider-side view of one subscription.
///
/// Carried by subscription created/updated events and returned by provider
/// lookups; always applied as a wholesale replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionState {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<DateTime<Utc>>,
}

/// Fields a deletion event contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionDeletion {
    pub subscription_id: SubscriptionId,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRef {
    pub invoice_id: String,
    pub subscription_id: Option<SubscriptionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRef {
    pub payment_intent_id: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

/// Closed set of event kinds the reconciler understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingEventKind {
    PaymentSucceeded(PaymentRef),
    PaymentFailed(PaymentRef),
    InvoicePaid(InvoiceRef),
    InvoiceFailed(InvoiceRef),
    SubscriptionCreated(SubscriptionState),
    SubscriptionUpdated(SubscriptionState),
    SubscriptionDeleted(SubscriptionDeletion),
    /// Any provider event type not listed above. Acknowledged, never applied.
    Unhandled { event_type: String },
}

impl BillingEventKind {
    /// Stable name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            BillingEventKind::PaymentSucceeded(_) => "payment_succeeded",
            BillingEventKind::PaymentFailed(_) => "payment_failed",
            BillingEventKind::InvoicePaid(_) => "invoice_paid",
            BillingEventKind::InvoiceFailed(_) => "invoice_failed",
            BillingEventKind::SubscriptionCreated(_) => "subscription_created",
            BillingEventKind::SubscriptionUpdated(_) => "subscription_updated",
            BillingEventKind::SubscriptionDeleted(_) => "subscription_deleted",
            BillingEventKind::Unhandled { .. } => "unhandled",
        }
    }

    /// Whether applying this kind may change an account snapshot.
    pub fn mutates_snapshot(&self) -> bool {
        matches!(
            self,
            BillingEventKind::InvoicePaid(_)
                | BillingEventKind::SubscriptionCreated(_)
                | BillingEventKind::SubscriptionUpdated(_)
                | BillingEventKind::SubscriptionDeleted(_)
        )
    }
}

/// One provider notification after verification and normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingEvent {
    pub id: EventId,
    pub kind: BillingEventKind,
    /// Required for subscription and invoice kinds.
    pub subject_customer_id: Option<CustomerId>,
    /// Provider-reported time. Informational only; never used for ordering.
    pub occurred_at: DateTime<Utc>,
}

impl BillingEvent {
    pub fn new(
        id: EventId,
        kind: BillingEventKind,
        subject_customer_id: Option<CustomerId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            subject_customer_id,
            occurred_at,
        }
    }
}
