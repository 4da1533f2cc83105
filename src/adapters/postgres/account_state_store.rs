//! PostgreSQL implementation of AccountStateStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{SubscriptionSnapshot, SubscriptionStatus, VersionedSnapshot};
use crate::domain::foundation::{AccountId, DomainError, EventId, SubscriptionId};
use crate::ports::{AccountStateStore, CasOutcome};

/// Snapshot rows live in `subscription_snapshots`, one per account.
pub struct PostgresAccountStateStore {
    pool: PgPool,
}

impl PostgresAccountStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    stripe_subscription_id: Option<String>,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    trial_end: Option<DateTime<Utc>>,
    last_applied_event_id: Option<String>,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for VersionedSnapshot {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| {
            DomainError::database(format!("Invalid status value: {}", row.status))
        })?;
        let subscription_id = row
            .stripe_subscription_id
            .map(SubscriptionId::new)
            .transpose()
            .map_err(|e| DomainError::database(format!("Invalid subscription id: {}", e)))?;
        let last_applied_event_id = row
            .last_applied_event_id
            .map(EventId::new)
            .transpose()
            .map_err(|e| DomainError::database(format!("Invalid event id: {}", e)))?;

        Ok(VersionedSnapshot {
            snapshot: SubscriptionSnapshot::restore(
                subscription_id,
                status,
                row.current_period_end,
                row.cancel_at_period_end,
                row.trial_end,
                last_applied_event_id,
            ),
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

fn account_uuid(account_id: &AccountId) -> Uuid {
    *account_id.as_uuid()
}

#[async_trait]
impl AccountStateStore for PostgresAccountStateStore {
    async fn load(&self, account_id: &AccountId) -> Result<Option<VersionedSnapshot>, DomainError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT stripe_subscription_id, status, current_period_end, cancel_at_period_end,
                   trial_end, last_applied_event_id, version, updated_at
            FROM subscription_snapshots
            WHERE account_id = $1
            "#,
        )
        .bind(account_uuid(account_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to load snapshot: {}", e)))?;

        row.map(VersionedSnapshot::try_from).transpose()
    }

    async fn compare_and_swap(
        &self,
        account_id: &AccountId,
        expected_version: Option<i64>,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<CasOutcome, DomainError> {
        let subscription_id = snapshot.subscription_id().map(|s| s.as_str());
        let last_event = snapshot.last_applied_event_id().map(|e| e.as_str());
        let now = Utc::now();

        let version: Option<i64> = match expected_version {
            None => sqlx::query_scalar(
                r#"
                INSERT INTO subscription_snapshots (
                    account_id, stripe_subscription_id, status, current_period_end,
                    cancel_at_period_end, trial_end, last_applied_event_id, version, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8)
                ON CONFLICT (account_id) DO NOTHING
                RETURNING version
                "#,
            )
            .bind(account_uuid(account_id))
            .bind(subscription_id)
            .bind(snapshot.status().as_str())
            .bind(snapshot.current_period_end())
            .bind(snapshot.cancel_at_period_end())
            .bind(snapshot.trial_end())
            .bind(last_event)
            .bind(now)
            .fetch_optional(&self.pool)
            .await,
            Some(expected) => sqlx::query_scalar(
                r#"
                UPDATE subscription_snapshots SET
                    stripe_subscription_id = $2,
                    status = $3,
                    current_period_end = $4,
                    cancel_at_period_end = $5,
                    trial_end = $6,
                    last_applied_event_id = $7,
                    updated_at = $8,
                    version = version + 1
                WHERE account_id = $1 AND version = $9
                RETURNING version
                "#,
            )
            .bind(account_uuid(account_id))
            .bind(subscription_id)
            .bind(snapshot.status().as_str())
            .bind(snapshot.current_period_end())
            .bind(snapshot.cancel_at_period_end())
            .bind(snapshot.trial_end())
            .bind(last_event)
            .bind(now)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await,
        }
        .map_err(|e| DomainError::database(format!("Failed to write snapshot: {}", e)))?;

        Ok(match version {
            Some(version) => CasOutcome::Written { version },
            None => CasOutcome::Conflict,
        })
    }
}
