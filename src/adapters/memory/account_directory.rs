//! In-memory customer to account mapping.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{AccountId, CustomerId, DomainError};
use crate::ports::AccountDirectory;

#[derive(Default)]
pub struct InMemoryAccountDirectory {
    links: RwLock<HashMap<CustomerId, AccountId>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a provider customer to a local account.
    pub async fn link(&self, customer_id: CustomerId, account_id: AccountId) {
        self.links.write().await.insert(customer_id, account_id);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn resolve(&self, customer_id: &CustomerId) -> Result<Option<AccountId>, DomainError> {
        Ok(self.links.read().await.get(customer_id).copied())
    }
}
