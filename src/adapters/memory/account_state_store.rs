//! In-memory account state store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::billing::{SubscriptionSnapshot, VersionedSnapshot};
use crate::domain::foundation::{AccountId, DomainError};
use crate::ports::{AccountStateStore, CasOutcome};

/// Snapshot store keyed by account.
#[derive(Default)]
pub struct InMemoryAccountStateStore {
    snapshots: Mutex<HashMap<AccountId, VersionedSnapshot>>,
}

impl InMemoryAccountStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot without going through the port, for assertions.
    pub async fn get(&self, account_id: &AccountId) -> Option<VersionedSnapshot> {
        self.snapshots.lock().await.get(account_id).cloned()
    }
}

#[async_trait]
impl AccountStateStore for InMemoryAccountStateStore {
    async fn load(&self, account_id: &AccountId) -> Result<Option<VersionedSnapshot>, DomainError> {
        Ok(self.get(account_id).await)
    }

    async fn compare_and_swap(
        &self,
        account_id: &AccountId,
        expected_version: Option<i64>,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<CasOutcome, DomainError> {
        let mut snapshots = self.snapshots.lock().await;
        let current = snapshots.get(account_id).map(|s| s.version);
        if current != expected_version {
            return Ok(CasOutcome::Conflict);
        }

        let version = current.map_or(1, |v| v + 1);
        snapshots.insert(
            *account_id,
            VersionedSnapshot {
                snapshot: snapshot.clone(),
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(CasOutcome::Written { version })
    }
}
