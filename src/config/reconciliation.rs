//! Reconciliation pipeline tuning

use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::RetryPolicy;

use super::error::ValidationError;

/// Shortest retention that still covers the provider's redelivery window.
const MIN_RETENTION_DAYS: i64 = 3;

/// Which backend holds the idempotency ledger.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Postgres,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Deadline for admit + reconcile + complete, in milliseconds
    #[serde(default = "default_processing_deadline")]
    pub processing_deadline_ms: u64,

    /// Attempts per store call, including the first
    #[serde(default = "default_store_max_attempts")]
    pub store_max_attempts: u32,

    /// Backoff before the second attempt; doubles afterwards
    #[serde(default = "default_store_retry_base_delay")]
    pub store_retry_base_delay_ms: u64,

    /// Age after which an unfinished claim may be taken over
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    /// How long processed event ids are remembered
    #[serde(default = "default_retention_days")]
    pub idempotency_retention_days: i64,

    /// Interval between ledger purges
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    #[serde(default)]
    pub ledger_backend: LedgerBackend,
}

impl ReconciliationConfig {
    pub fn processing_deadline(&self) -> Duration {
        Duration::from_millis(self.processing_deadline_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_max_attempts,
            Duration::from_millis(self.store_retry_base_delay_ms),
        )
    }

    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_lease_secs as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.idempotency_retention_days)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Validate reconciliation settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.processing_deadline_ms == 0 {
            return Err(ValidationError::InvalidReconciliation(
                "processing_deadline_ms must be positive",
            ));
        }
        if self.store_max_attempts == 0 {
            return Err(ValidationError::InvalidReconciliation(
                "store_max_attempts must be at least 1",
            ));
        }
        // A claim must outlive the request that holds it.
        if self.claim_lease_secs.saturating_mul(1000) <= self.processing_deadline_ms {
            return Err(ValidationError::InvalidReconciliation(
                "claim_lease_secs must exceed the processing deadline",
            ));
        }
        if self.idempotency_retention_days < MIN_RETENTION_DAYS {
            return Err(ValidationError::InvalidReconciliation(
                "idempotency_retention_days must cover the redelivery window",
            ));
        }
        if self.purge_interval_secs == 0 {
            return Err(ValidationError::InvalidReconciliation(
                "purge_interval_secs must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            processing_deadline_ms: default_processing_deadline(),
            store_max_attempts: default_store_max_attempts(),
            store_retry_base_delay_ms: default_store_retry_base_delay(),
            claim_lease_secs: default_claim_lease(),
            idempotency_retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval(),
            ledger_backend: LedgerBackend::default(),
        }
    }
}

fn default_processing_deadline() -> u64 {
    10_000
}

fn default_store_max_attempts() -> u32 {
    3
}

fn default_store_retry_base_delay() -> u64 {
    50
}

fn default_claim_lease() -> u64 {
    30
}

fn default_retention_days() -> i64 {
    30
}

fn default_purge_interval() -> u64 {
    3600
}
