//! In-memory idempotency ledger.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, EventId};
use crate::ports::{Admission, IdempotencyLedger, IdempotencyRecord};

/// Ledger backed by a `HashMap` behind one lock.
pub struct InMemoryIdempotencyLedger {
    records: Mutex<HashMap<EventId, IdempotencyRecord>>,
    claim_lease: Duration,
}

impl InMemoryIdempotencyLedger {
    pub fn new(claim_lease: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            claim_lease,
        }
    }

    /// Number of entries, claimed or processed.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a record directly, bypassing the claim protocol.
    pub async fn seed(&self, record: IdempotencyRecord) {
        self.records
            .lock()
            .await
            .insert(record.event_id.clone(), record);
    }
}

impl Default for InMemoryIdempotencyLedger {
    fn default() -> Self {
        Self::new(Duration::seconds(30))
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryIdempotencyLedger {
    async fn admit(&self, event_id: &EventId) -> Result<Admission, DomainError> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        if let Some(existing) = records.get(event_id) {
            let stale = !existing.is_processed() && existing.claimed_at + self.claim_lease < now;
            if !stale {
                return Ok(Admission::AlreadyProcessed);
            }
        }

        records.insert(
            event_id.clone(),
            IdempotencyRecord {
                event_id: event_id.clone(),
                claimed_at: now,
                processed_at: None,
            },
        );
        Ok(Admission::Admitted)
    }

    async fn complete(&self, event_id: &EventId) -> Result<(), DomainError> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        records
            .entry(event_id.clone())
            .and_modify(|r| r.processed_at = Some(now))
            .or_insert_with(|| IdempotencyRecord {
                event_id: event_id.clone(),
                claimed_at: now,
                processed_at: Some(now),
            });
        Ok(())
    }

    async fn release(&self, event_id: &EventId) -> Result<(), DomainError> {
        let mut records = self.records.lock().await;
        if records.get(event_id).is_some_and(|r| !r.is_processed()) {
            records.remove(event_id);
        }
        Ok(())
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<IdempotencyRecord>, DomainError> {
        Ok(self.records.lock().await.get(event_id).cloned())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.processed_at.unwrap_or(r.claimed_at) >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn evt(id: &str) -> EventId {
        EventId::new(id).unwrap()
    }

    #[tokio::test]
    async fn first_admit_wins() {
        let ledger = InMemoryIdempotencyLedger::default();

        assert_eq!(ledger.admit(&evt("evt_1")).await.unwrap(), Admission::Admitted);
        assert_eq!(
            ledger.admit(&evt("evt_1")).await.unwrap(),
            Admission::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn completed_event_stays_processed() {
        let ledger = InMemoryIdempotencyLedger::default();
        ledger.admit(&evt("evt_1")).await.unwrap();
        ledger.complete(&evt("evt_1")).await.unwrap();

        ledger.release(&evt("evt_1")).await.unwrap();

        let record = ledger.find(&evt("evt_1")).await.unwrap().unwrap();
        assert!(record.is_processed());
        assert_eq!(
            ledger.admit(&evt("evt_1")).await.unwrap(),
            Admission::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn released_claim_leaves_no_record() {
        let ledger = InMemoryIdempotencyLedger::default();
        ledger.admit(&evt("evt_3")).await.unwrap();

        ledger.release(&evt("evt_3")).await.unwrap();

        assert!(ledger.find(&evt("evt_3")).await.unwrap().is_none());
        assert_eq!(ledger.admit(&evt("evt_3")).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn stale_claim_can_be_taken_over() {
        let ledger = InMemoryIdempotencyLedger::new(Duration::seconds(30));
        ledger
            .seed(IdempotencyRecord {
                event_id: evt("evt_1"),
                claimed_at: Utc::now() - Duration::minutes(5),
                processed_at: None,
            })
            .await;

        assert_eq!(ledger.admit(&evt("evt_1")).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn purge_removes_only_old_entries() {
        let ledger = InMemoryIdempotencyLedger::default();
        let old = Utc::now() - Duration::days(40);
        ledger
            .seed(IdempotencyRecord {
                event_id: evt("evt_old"),
                claimed_at: old,
                processed_at: Some(old),
            })
            .await;
        ledger.admit(&evt("evt_new")).await.unwrap();
        ledger.complete(&evt("evt_new")).await.unwrap();

        let purged = ledger
            .purge_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(ledger.find(&evt("evt_new")).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admits_admit_exactly_one() {
        let ledger = Arc::new(InMemoryIdempotencyLedger::default());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.admit(&evt("evt_race")).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() == Admission::Admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
