//! In-memory stand-in for the provider's subscription API.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::billing::SubscriptionState;
use crate::domain::foundation::{DomainError, SubscriptionId};
use crate::ports::SubscriptionSource;

#[derive(Default)]
pub struct InMemorySubscriptionSource {
    subscriptions: RwLock<HashMap<SubscriptionId, SubscriptionState>>,
}

impl InMemorySubscriptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, state: SubscriptionState) {
        self.subscriptions
            .write()
            .await
            .insert(state.subscription_id.clone(), state);
    }
}

#[async_trait]
impl SubscriptionSource for InMemorySubscriptionSource {
    async fn fetch_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionState>, DomainError> {
        Ok(self.subscriptions.read().await.get(subscription_id).cloned())
    }
}
