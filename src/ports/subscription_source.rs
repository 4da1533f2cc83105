//! SubscriptionSource port - Query the provider for a subscription by id.
//!
//! Used to refresh a snapshot wholesale when an invoice is paid, keeping the
//! local copy authoritative against drift.

use async_trait::async_trait;

use crate::domain::billing::SubscriptionState;
use crate::domain::foundation::{DomainError, SubscriptionId};

#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Fetch the provider's current view of `subscription_id`.
    ///
    /// Returns `None` if the provider does not know the subscription.
    async fn fetch_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionState>, DomainError>;
}
