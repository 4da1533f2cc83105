//! IdempotencyLedger port - Gate that turns at-least-once delivery into
//! effectively-once application.
//!
//! ## Claim Lifecycle
//!
//! 1. `admit` atomically claims an event id. Exactly one concurrent caller
//!    for the same id observes `Admitted`.
//! 2. After reconciliation succeeds, `complete` turns the claim into a
//!    durable processed record.
//! 3. After a transient failure, `release` withdraws the claim so the
//!    provider's redelivery is admitted again.
//!
//! A claim that is neither completed nor released (process crash, lost
//! connection) expires after the implementation's lease and can then be
//! admitted again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::{DomainError, EventId};

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller owns the event and must reconcile it.
    Admitted,
    /// Event was processed, or is being processed by another delivery.
    AlreadyProcessed,
}

/// Stored ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub event_id: EventId,
    pub claimed_at: DateTime<Utc>,
    /// Set once reconciliation succeeded; `None` while only claimed.
    pub processed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Port for the idempotency ledger.
///
/// Implementations must make `admit` a single atomic operation against the
/// backing store (unique key insert, `SET NX`, or equivalent), never a
/// read followed by a write.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Atomically claim `event_id`.
    async fn admit(&self, event_id: &EventId) -> Result<Admission, DomainError>;

    /// Mark a claimed event as processed.
    async fn complete(&self, event_id: &EventId) -> Result<(), DomainError>;

    /// Withdraw an unfinished claim. Processed records are left untouched.
    async fn release(&self, event_id: &EventId) -> Result<(), DomainError>;

    /// Look up the entry for `event_id`, if any.
    async fn find(&self, event_id: &EventId) -> Result<Option<IdempotencyRecord>, DomainError>;

    /// Delete entries older than `cutoff`.
    ///
    /// Returns the number of entries deleted. The retention window must be
    /// longer than the provider's redelivery window.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError>;
}
