//! PurgeIdempotencyRecordsHandler - Retention sweep for the idempotency ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::foundation::DomainError;
use crate::ports::IdempotencyLedger;

/// Command to delete ledger entries older than `retention`.
#[derive(Debug, Clone, Copy)]
pub struct PurgeIdempotencyRecordsCommand {
    pub retention: chrono::Duration,
}

pub struct PurgeIdempotencyRecordsHandler {
    ledger: Arc<dyn IdempotencyLedger>,
}

impl PurgeIdempotencyRecordsHandler {
    pub fn new(ledger: Arc<dyn IdempotencyLedger>) -> Self {
        Self { ledger }
    }

    /// Returns the number of entries deleted.
    pub async fn handle(&self, cmd: PurgeIdempotencyRecordsCommand) -> Result<u64, DomainError> {
        let cutoff = Utc::now() - cmd.retention;
        let purged = self.ledger.purge_before(cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, cutoff = %cutoff, "Purged idempotency records");
        }
        Ok(purged)
    }

    /// Run the sweep every `interval` until the task is dropped.
    ///
    /// Failures are logged and retried on the next tick.
    pub async fn run_every(self: Arc<Self>, interval: Duration, cmd: PurgeIdempotencyRecordsCommand) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = self.handle(cmd).await {
                tracing::error!(error = %err, "Idempotency purge failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryIdempotencyLedger;
    use crate::domain::foundation::EventId;
    use crate::ports::IdempotencyRecord;

    #[tokio::test]
    async fn purges_entries_past_retention() {
        let ledger = Arc::new(InMemoryIdempotencyLedger::default());
        let old = Utc::now() - chrono::Duration::days(45);
        ledger
            .seed(IdempotencyRecord {
                event_id: EventId::new("evt_old").unwrap(),
                claimed_at: old,
                processed_at: Some(old),
            })
            .await;
        let handler = PurgeIdempotencyRecordsHandler::new(ledger.clone());

        let purged = handler
            .handle(PurgeIdempotencyRecordsCommand {
                retention: chrono::Duration::days(30),
            })
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn recent_entries_survive() {
        let ledger = Arc::new(InMemoryIdempotencyLedger::default());
        let event_id = EventId::new("evt_recent").unwrap();
        ledger.admit(&event_id).await.unwrap();
        ledger.complete(&event_id).await.unwrap();
        let handler = PurgeIdempotencyRecordsHandler::new(ledger.clone());

        let purged = handler
            .handle(PurgeIdempotencyRecordsCommand {
                retention: chrono::Duration::days(30),
            })
            .await
            .unwrap();

        assert_eq!(purged, 0);
        assert_eq!(ledger.len().await, 1);
    }
}
