//! Per-account subscription snapshot.
//!
//! # Invariants
//!
//! - `status == Canceled` implies `cancel_at_period_end == true`
//! - Every constructor replaces all owned fields; there is no partial patch

use chrono::{DateTime, Utc};

use crate::domain::foundation::{EventId, SubscriptionId};

use super::billing_event::{SubscriptionDeletion, SubscriptionState};
use super::status::SubscriptionStatus;

/// Local copy of an account's subscription, as last reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    subscription_id: Option<SubscriptionId>,
    status: SubscriptionStatus,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    trial_end: Option<DateTime<Utc>>,
    last_applied_event_id: Option<EventId>,
}

impl SubscriptionSnapshot {
    /// Snapshot for an account that never had a subscription.
    pub fn empty() -> Self {
        Self {
            subscription_id: None,
            status: SubscriptionStatus::None,
            current_period_end: None,
            cancel_at_period_end: false,
            trial_end: None,
            last_applied_event_id: None,
        }
    }

    /// Wholesale replacement from a full provider subscription.
    pub fn from_provider_state(state: &SubscriptionState, applied_by: &EventId) -> Self {
        Self::restore(
            Some(state.subscription_id.clone()),
            state.status,
            state.current_period_end,
            state.cancel_at_period_end,
            state.trial_end,
            Some(applied_by.clone()),
        )
    }

    /// Terminal snapshot after the provider deleted the subscription.
    ///
    /// The period end comes from the deletion payload when present, otherwise
    /// it is carried over from `previous`.
    pub fn canceled(
        previous: Option<&SubscriptionSnapshot>,
        deletion: &SubscriptionDeletion,
        applied_by: &EventId,
    ) -> Self {
        let current_period_end = deletion
            .current_period_end
            .or_else(|| previous.and_then(|p| p.current_period_end));

        Self {
            subscription_id: Some(deletion.subscription_id.clone()),
            status: SubscriptionStatus::Canceled,
            current_period_end,
            cancel_at_period_end: true,
            trial_end: None,
            last_applied_event_id: Some(applied_by.clone()),
        }
    }

    /// Rebuilds a snapshot from persisted fields.
    pub fn restore(
        subscription_id: Option<SubscriptionId>,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: bool,
        trial_end: Option<DateTime<Utc>>,
        last_applied_event_id: Option<EventId>,
    ) -> Self {
        Self {
            subscription_id,
            status,
            current_period_end,
            cancel_at_period_end: cancel_at_period_end || status == SubscriptionStatus::Canceled,
            trial_end,
            last_applied_event_id,
        }
    }

    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        self.subscription_id.as_ref()
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn current_period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
    }

    pub fn cancel_at_period_end(&self) -> bool {
        self.cancel_at_period_end
    }

    pub fn trial_end(&self) -> Option<DateTime<Utc>> {
        self.trial_end
    }

    pub fn last_applied_event_id(&self) -> Option<&EventId> {
        self.last_applied_event_id.as_ref()
    }
}

impl Default for SubscriptionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// A snapshot together with the store's concurrency token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSnapshot {
    pub snapshot: SubscriptionSnapshot,
    /// Incremented by the store on every successful write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}
