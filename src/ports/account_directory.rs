//! AccountDirectory port - Provider customer id to local account id.

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, CustomerId, DomainError};

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolve the account linked to `customer_id`.
    ///
    /// Returns `None` when no local account maps to the customer; errors are
    /// reserved for backend failures.
    async fn resolve(&self, customer_id: &CustomerId) -> Result<Option<AccountId>, DomainError>;
}
