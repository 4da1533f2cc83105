//! GetSubscriptionSnapshotHandler - Query handler for an account's snapshot.

use std::sync::Arc;

use crate::domain::billing::VersionedSnapshot;
use crate::domain::foundation::{AccountId, DomainError};
use crate::ports::AccountStateStore;

/// Query for the current snapshot of one account.
#[derive(Debug, Clone)]
pub struct GetSubscriptionSnapshotQuery {
    pub account_id: AccountId,
}

/// `None` when the account has never had a subscription event applied.
pub type GetSubscriptionSnapshotResult = Option<VersionedSnapshot>;

pub struct GetSubscriptionSnapshotHandler {
    store: Arc<dyn AccountStateStore>,
}

impl GetSubscriptionSnapshotHandler {
    pub fn new(store: Arc<dyn AccountStateStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionSnapshotQuery,
    ) -> Result<GetSubscriptionSnapshotResult, DomainError> {
        self.store.load(&query.account_id).await
    }
}
