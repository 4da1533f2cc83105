//! PostgreSQL implementation of AccountDirectory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{AccountId, CustomerId, DomainError};
use crate::ports::AccountDirectory;

/// Resolves customers through the unique `accounts.stripe_customer_id` column.
pub struct PostgresAccountDirectory {
    pool: PgPool,
}

impl PostgresAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    async fn resolve(&self, customer_id: &CustomerId) -> Result<Option<AccountId>, DomainError> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM accounts WHERE stripe_customer_id = $1")
                .bind(customer_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to resolve customer: {}", e)))?;

        Ok(id.map(AccountId::from_uuid))
    }
}
