//! PostgreSQL implementation of IdempotencyLedger.
//!
//! Admission is a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE`: the
//! update branch only fires for an unfinished claim older than the lease, so
//! the primary key decides every race.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, EventId};
use crate::ports::{Admission, IdempotencyLedger, IdempotencyRecord};

pub struct PostgresIdempotencyLedger {
    pool: PgPool,
    claim_lease: Duration,
}

impl PostgresIdempotencyLedger {
    pub fn new(pool: PgPool, claim_lease: Duration) -> Self {
        Self { pool, claim_lease }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IdempotencyRow {
    event_id: String,
    claimed_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = DomainError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        Ok(IdempotencyRecord {
            event_id: EventId::new(row.event_id)
                .map_err(|e| DomainError::database(format!("Invalid event_id: {}", e)))?,
            claimed_at: row.claimed_at,
            processed_at: row.processed_at,
        })
    }
}

#[async_trait]
impl IdempotencyLedger for PostgresIdempotencyLedger {
    async fn admit(&self, event_id: &EventId) -> Result<Admission, DomainError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_records (event_id, claimed_at)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO UPDATE
                SET claimed_at = EXCLUDED.claimed_at
                WHERE idempotency_records.processed_at IS NULL
                  AND idempotency_records.claimed_at < $3
            "#,
        )
        .bind(event_id.as_str())
        .bind(now)
        .bind(now - self.claim_lease)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to claim event: {}", e)))?;

        if result.rows_affected() == 1 {
            Ok(Admission::Admitted)
        } else {
            Ok(Admission::AlreadyProcessed)
        }
    }

    async fn complete(&self, event_id: &EventId) -> Result<(), DomainError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO idempotency_records (event_id, claimed_at, processed_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (event_id) DO UPDATE
                SET processed_at = EXCLUDED.processed_at
                WHERE idempotency_records.processed_at IS NULL
            "#,
        )
        .bind(event_id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to complete event: {}", e)))?;

        Ok(())
    }

    async fn release(&self, event_id: &EventId) -> Result<(), DomainError> {
        sqlx::query(
            "DELETE FROM idempotency_records WHERE event_id = $1 AND processed_at IS NULL",
        )
        .bind(event_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to release claim: {}", e)))?;

        Ok(())
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<IdempotencyRecord>, DomainError> {
        let row: Option<IdempotencyRow> = sqlx::query_as(
            r#"
            SELECT event_id, claimed_at, processed_at
            FROM idempotency_records
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find event: {}", e)))?;

        row.map(IdempotencyRecord::try_from).transpose()
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_records WHERE COALESCE(processed_at, claimed_at) < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to purge records: {}", e)))?;

        Ok(result.rows_affected())
    }
}
