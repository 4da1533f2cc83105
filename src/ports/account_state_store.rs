//! AccountStateStore port - Keyed store of per-account subscription snapshots.
//!
//! Writes are compare-and-swap on the snapshot version so two concurrent
//! reconciliations for the same account can never interleave a read from one
//! with a write from the other.

use async_trait::async_trait;

use crate::domain::billing::{SubscriptionSnapshot, VersionedSnapshot};
use crate::domain::foundation::{AccountId, DomainError};

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Write applied; carries the new version.
    Written { version: i64 },
    /// Another writer got there first; reload and retry.
    Conflict,
}

#[async_trait]
pub trait AccountStateStore: Send + Sync {
    /// Load the current snapshot for `account_id`, if one exists.
    async fn load(&self, account_id: &AccountId) -> Result<Option<VersionedSnapshot>, DomainError>;

    /// Write `snapshot` if the stored version still equals `expected_version`.
    ///
    /// `expected_version = None` means "create only if no snapshot exists".
    async fn compare_and_swap(
        &self,
        account_id: &AccountId,
        expected_version: Option<i64>,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<CasOutcome, DomainError>;
}
