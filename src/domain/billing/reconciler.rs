//! Reconciliation engine - Converges local snapshots onto provider state.
//!
//! ## Policy
//!
//! Last writer wins by event identity. Ordering is decided once, at the
//! idempotency gate; `occurred_at` is never consulted. Each kind overwrites
//! every field it owns instead of merging deltas, so a given event always
//! produces the same snapshot no matter what it lands on.
//!
//! ## Concurrency
//!
//! Provider lookups happen before the read-modify-write, so nothing is held
//! across a network call to the provider. The write itself is a version
//! compare-and-swap; on conflict the snapshot is reloaded and the update is
//! recomputed.
//!
//! ## Failure Handling
//!
//! Store and directory calls are retried with exponential backoff up to the
//! configured attempt limit. Exhaustion, provider failure, and persistent
//! contention all surface as `ReconciliationError`, which the caller must not
//! acknowledge.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use crate::domain::foundation::{AccountId, DomainError, EventId};
use crate::ports::{AccountDirectory, AccountStateStore, CasOutcome, SubscriptionSource};

use super::billing_event::{BillingEvent, BillingEventKind, SubscriptionDeletion, SubscriptionState};
use super::errors::ReconciliationError;
use super::snapshot::SubscriptionSnapshot;
use super::status::SubscriptionStatus;

/// Bounded retry for store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Also caps CAS conflict reloads.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// Outcome of reconciling one event, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    /// True if the account snapshot was written.
    pub applied: bool,
    /// Resolved account, when the event had one.
    pub account_id: Option<AccountId>,
    /// Snapshot status after processing, when known.
    pub new_status: Option<SubscriptionStatus>,
}

impl ReconciliationResult {
    fn skipped() -> Self {
        Self {
            applied: false,
            account_id: None,
            new_status: None,
        }
    }

    fn unchanged(account_id: AccountId, status: Option<SubscriptionStatus>) -> Self {
        Self {
            applied: false,
            account_id: Some(account_id),
            new_status: status,
        }
    }

    fn applied(account_id: AccountId, status: SubscriptionStatus) -> Self {
        Self {
            applied: true,
            account_id: Some(account_id),
            new_status: Some(status),
        }
    }
}

/// The field overwrite an event resolves to, computed before touching the
/// store.
#[derive(Debug, Clone)]
enum SnapshotUpdate {
    Replace(SubscriptionState),
    Cancel(SubscriptionDeletion),
}

impl SnapshotUpdate {
    fn apply_to(
        &self,
        previous: Option<&SubscriptionSnapshot>,
        event_id: &EventId,
    ) -> SubscriptionSnapshot {
        match self {
            SnapshotUpdate::Replace(state) => SubscriptionSnapshot::from_provider_state(state, event_id),
            SnapshotUpdate::Cancel(deletion) => {
                SubscriptionSnapshot::canceled(previous, deletion, event_id)
            }
        }
    }
}

/// Applies normalized billing events to account snapshots.
pub struct ReconciliationEngine {
    directory: Arc<dyn AccountDirectory>,
    store: Arc<dyn AccountStateStore>,
    subscriptions: Arc<dyn SubscriptionSource>,
    retry: RetryPolicy,
}

impl ReconciliationEngine {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        store: Arc<dyn AccountStateStore>,
        subscriptions: Arc<dyn SubscriptionSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            directory,
            store,
            subscriptions,
            retry,
        }
    }

    /// Reconcile one event.
    ///
    /// A customer with no local account is a lookup miss: logged, reported
    /// as not applied, and never an error.
    pub async fn reconcile(
        &self,
        event: &BillingEvent,
    ) -> Result<ReconciliationResult, ReconciliationError> {
        if !event.kind.mutates_snapshot() {
            log_observed(event);
            return Ok(ReconciliationResult::skipped());
        }

        let Some(customer_id) = event.subject_customer_id.as_ref() else {
            tracing::warn!(
                event_id = %event.id,
                kind = event.kind.name(),
                "Event has no customer; nothing to reconcile"
            );
            return Ok(ReconciliationResult::skipped());
        };

        let account_id = match self
            .with_retry("resolve_account", || self.directory.resolve(customer_id))
            .await?
        {
            Some(account_id) => account_id,
            None => {
                tracing::warn!(
                    event_id = %event.id,
                    kind = event.kind.name(),
                    customer_id = %customer_id,
                    "No local account for customer; acknowledging without change"
                );
                return Ok(ReconciliationResult::skipped());
            }
        };

        let update = match &event.kind {
            BillingEventKind::SubscriptionCreated(state)
            | BillingEventKind::SubscriptionUpdated(state) => SnapshotUpdate::Replace(state.clone()),
            BillingEventKind::SubscriptionDeleted(deletion) => {
                SnapshotUpdate::Cancel(deletion.clone())
            }
            BillingEventKind::InvoicePaid(invoice) => {
                let Some(subscription_id) = invoice.subscription_id.as_ref() else {
                    tracing::debug!(
                        event_id = %event.id,
                        invoice_id = %invoice.invoice_id,
                        "Paid invoice has no subscription; nothing to refresh"
                    );
                    return Ok(ReconciliationResult::unchanged(account_id, None));
                };

                match self
                    .subscriptions
                    .fetch_subscription(subscription_id)
                    .await
                    .map_err(ReconciliationError::ProviderUnavailable)?
                {
                    Some(state) => SnapshotUpdate::Replace(state),
                    None => {
                        tracing::warn!(
                            event_id = %event.id,
                            subscription_id = %subscription_id,
                            "Provider does not know subscription referenced by paid invoice"
                        );
                        return Ok(ReconciliationResult::unchanged(account_id, None));
                    }
                }
            }
            BillingEventKind::PaymentSucceeded(_)
            | BillingEventKind::PaymentFailed(_)
            | BillingEventKind::InvoiceFailed(_)
            | BillingEventKind::Unhandled { .. } => return Ok(ReconciliationResult::skipped()),
        };

        self.write_snapshot(account_id, &event.id, event.kind.name(), &update)
            .await
    }

    /// Load, recompute, compare-and-swap; reload on conflict.
    async fn write_snapshot(
        &self,
        account_id: AccountId,
        event_id: &EventId,
        kind: &'static str,
        update: &SnapshotUpdate,
    ) -> Result<ReconciliationResult, ReconciliationError> {
        for attempt in 1..=self.retry.max_attempts {
            let current = self
                .with_retry("load_snapshot", || self.store.load(&account_id))
                .await?;

            let (expected_version, previous) = match &current {
                Some(versioned) => (Some(versioned.version), Some(&versioned.snapshot)),
                None => (None, None),
            };
            let next = update.apply_to(previous, event_id);

            if previous == Some(&next) {
                tracing::debug!(
                    event_id = %event_id,
                    account_id = %account_id,
                    "Snapshot already reflects event"
                );
                return Ok(ReconciliationResult::unchanged(
                    account_id,
                    Some(next.status()),
                ));
            }

            let outcome = self
                .with_retry("write_snapshot", || {
                    self.store
                        .compare_and_swap(&account_id, expected_version, &next)
                })
                .await?;

            match outcome {
                CasOutcome::Written { version } => {
                    tracing::info!(
                        event_id = %event_id,
                        kind,
                        account_id = %account_id,
                        status = %next.status(),
                        version,
                        "Subscription snapshot reconciled"
                    );
                    return Ok(ReconciliationResult::applied(account_id, next.status()));
                }
                CasOutcome::Conflict => {
                    tracing::debug!(
                        event_id = %event_id,
                        account_id = %account_id,
                        attempt,
                        "Snapshot changed underneath; reloading"
                    );
                }
            }
        }

        Err(ReconciliationError::ContentionExhausted {
            account_id,
            attempts: self.retry.max_attempts,
        })
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, ReconciliationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.code.is_infrastructure() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Store call failed; retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Store call failed; giving up"
                    );
                    return Err(ReconciliationError::TransientStore {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

fn log_observed(event: &BillingEvent) {
    match &event.kind {
        BillingEventKind::PaymentSucceeded(payment) | BillingEventKind::PaymentFailed(payment) => {
            tracing::info!(
                event_id = %event.id,
                kind = event.kind.name(),
                payment_intent_id = %payment.payment_intent_id,
                amount = ?payment.amount,
                currency = ?payment.currency,
                "Payment event observed"
            );
        }
        BillingEventKind::InvoiceFailed(invoice) => {
            tracing::info!(
                event_id = %event.id,
                invoice_id = %invoice.invoice_id,
                customer_id = ?event.subject_customer_id.as_ref().map(|c| c.as_str()),
                "Invoice payment failed"
            );
        }
        BillingEventKind::Unhandled { event_type } => {
            tracing::debug!(event_id = %event.id, event_type = %event_type, "Unhandled event type");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::billing_event::{InvoiceRef, PaymentRef};
    use crate::domain::billing::snapshot::VersionedSnapshot;
    use crate::domain::foundation::{CustomerId, ErrorCode, SubscriptionId};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    struct MockDirectory {
        accounts: HashMap<String, AccountId>,
        failures: AtomicU32,
    }

    impl MockDirectory {
        fn with(customer: &str, account_id: AccountId) -> Self {
            let mut accounts = HashMap::new();
            accounts.insert(customer.to_string(), account_id);
            Self {
                accounts,
                failures: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AccountDirectory for MockDirectory {
        async fn resolve(
            &self,
            customer_id: &CustomerId,
        ) -> Result<Option<AccountId>, DomainError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(DomainError::database("directory offline"));
            }
            Ok(self.accounts.get(customer_id.as_str()).copied())
        }
    }

    #[derive(Default)]
    struct MockStore {
        rows: Mutex<HashMap<AccountId, VersionedSnapshot>>,
        load_failures: AtomicU32,
        forced_conflicts: AtomicU32,
        loads: AtomicU32,
        writes: AtomicU32,
    }

    impl MockStore {
        fn snapshot(&self, account_id: &AccountId) -> Option<VersionedSnapshot> {
            self.rows.lock().unwrap().get(account_id).cloned()
        }
    }

    #[async_trait]
    impl AccountStateStore for MockStore {
        async fn load(
            &self,
            account_id: &AccountId,
        ) -> Result<Option<VersionedSnapshot>, DomainError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.load_failures.load(Ordering::SeqCst) > 0 {
                self.load_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(DomainError::database("connection refused"));
            }
            Ok(self.snapshot(account_id))
        }

        async fn compare_and_swap(
            &self,
            account_id: &AccountId,
            expected_version: Option<i64>,
            snapshot: &SubscriptionSnapshot,
        ) -> Result<CasOutcome, DomainError> {
            if self.forced_conflicts.load(Ordering::SeqCst) > 0 {
                self.forced_conflicts.fetch_sub(1, Ordering::SeqCst);
                return Ok(CasOutcome::Conflict);
            }
            let mut rows = self.rows.lock().unwrap();
            let current = rows.get(account_id).map(|r| r.version);
            if current != expected_version {
                return Ok(CasOutcome::Conflict);
            }
            let version = current.unwrap_or(0) + 1;
            rows.insert(
                *account_id,
                VersionedSnapshot {
                    snapshot: snapshot.clone(),
                    version,
                    updated_at: Utc::now(),
                },
            );
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(CasOutcome::Written { version })
        }
    }

    #[derive(Default)]
    struct MockSource {
        subscriptions: HashMap<String, SubscriptionState>,
        offline: bool,
    }

    #[async_trait]
    impl SubscriptionSource for MockSource {
        async fn fetch_subscription(
            &self,
            subscription_id: &SubscriptionId,
        ) -> Result<Option<SubscriptionState>, DomainError> {
            if self.offline {
                return Err(DomainError::new(
                    ErrorCode::ExternalServiceError,
                    "provider timed out",
                ));
            }
            Ok(self.subscriptions.get(subscription_id.as_str()).cloned())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn state(sub: &str, status: SubscriptionStatus) -> SubscriptionState {
        SubscriptionState {
            subscription_id: SubscriptionId::new(sub).unwrap(),
            status,
            current_period_end: Some(ts(1_800_000_000)),
            cancel_at_period_end: false,
            trial_end: None,
        }
    }

    fn event(id: &str, kind: BillingEventKind) -> BillingEvent {
        BillingEvent::new(
            EventId::new(id).unwrap(),
            kind,
            Some(CustomerId::new("cus_1").unwrap()),
            ts(1_704_067_200),
        )
    }

    fn deleted(id: &str) -> BillingEvent {
        event(
            id,
            BillingEventKind::SubscriptionDeleted(SubscriptionDeletion {
                subscription_id: SubscriptionId::new("sub_1").unwrap(),
                current_period_end: None,
            }),
        )
    }

    struct Fixture {
        account_id: AccountId,
        directory: Arc<MockDirectory>,
        store: Arc<MockStore>,
        engine: ReconciliationEngine,
    }

    fn fixture_with_source(source: MockSource) -> Fixture {
        let account_id = AccountId::new();
        let directory = Arc::new(MockDirectory::with("cus_1", account_id));
        let store = Arc::new(MockStore::default());
        let engine = ReconciliationEngine::new(
            directory.clone(),
            store.clone(),
            Arc::new(source),
            fast_retry(),
        );
        Fixture {
            account_id,
            directory,
            store,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_source(MockSource::default())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscription Lifecycle
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn trialing_update_creates_snapshot_for_new_account() {
        let f = fixture();
        let mut trial = state("sub_1", SubscriptionStatus::Trialing);
        trial.trial_end = Some(ts(1_710_000_000));

        let result = f
            .engine
            .reconcile(&event("evt_1", BillingEventKind::SubscriptionUpdated(trial)))
            .await
            .unwrap();

        assert!(result.applied);
        assert_eq!(result.account_id, Some(f.account_id));
        assert_eq!(result.new_status, Some(SubscriptionStatus::Trialing));
        let stored = f.store.snapshot(&f.account_id).unwrap().snapshot;
        assert_eq!(stored.status(), SubscriptionStatus::Trialing);
        assert_eq!(stored.trial_end(), Some(ts(1_710_000_000)));
        assert!(!stored.cancel_at_period_end());
        assert_eq!(stored.last_applied_event_id().unwrap().as_str(), "evt_1");
    }

    #[tokio::test]
    async fn deletion_cancels_trialing_snapshot() {
        let f = fixture();
        let mut trial = state("sub_1", SubscriptionStatus::Trialing);
        trial.trial_end = Some(ts(1_710_000_000));
        f.engine
            .reconcile(&event("evt_1", BillingEventKind::SubscriptionUpdated(trial)))
            .await
            .unwrap();

        let result = f.engine.reconcile(&deleted("evt_2")).await.unwrap();

        assert_eq!(result.new_status, Some(SubscriptionStatus::Canceled));
        let stored = f.store.snapshot(&f.account_id).unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.snapshot.status(), SubscriptionStatus::Canceled);
        assert!(stored.snapshot.cancel_at_period_end());
        assert!(stored.snapshot.trial_end().is_none());
        assert_eq!(stored.snapshot.current_period_end(), Some(ts(1_800_000_000)));
    }

    #[tokio::test]
    async fn deletion_without_prior_snapshot_creates_canceled_one() {
        let f = fixture();

        let result = f.engine.reconcile(&deleted("evt_9")).await.unwrap();

        assert!(result.applied);
        let stored = f.store.snapshot(&f.account_id).unwrap().snapshot;
        assert_eq!(stored.status(), SubscriptionStatus::Canceled);
        assert!(stored.cancel_at_period_end());
    }

    #[tokio::test]
    async fn new_subscription_resets_canceled_snapshot_wholesale() {
        let f = fixture();
        f.engine.reconcile(&deleted("evt_1")).await.unwrap();

        f.engine
            .reconcile(&event(
                "evt_2",
                BillingEventKind::SubscriptionCreated(state("sub_2", SubscriptionStatus::Active)),
            ))
            .await
            .unwrap();

        let stored = f.store.snapshot(&f.account_id).unwrap().snapshot;
        assert_eq!(stored.subscription_id().unwrap().as_str(), "sub_2");
        assert_eq!(stored.status(), SubscriptionStatus::Active);
        assert!(!stored.cancel_at_period_end());
    }

    #[tokio::test]
    async fn late_event_still_overwrites_newer_snapshot() {
        let f = fixture();
        f.engine
            .reconcile(&event(
                "evt_new",
                BillingEventKind::SubscriptionUpdated(state("sub_1", SubscriptionStatus::PastDue)),
            ))
            .await
            .unwrap();

        let mut late = event(
            "evt_old",
            BillingEventKind::SubscriptionUpdated(state("sub_1", SubscriptionStatus::Active)),
        );
        late.occurred_at = ts(1_600_000_000);
        f.engine.reconcile(&late).await.unwrap();

        let stored = f.store.snapshot(&f.account_id).unwrap().snapshot;
        assert_eq!(stored.status(), SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn reapplying_same_event_skips_write() {
        let f = fixture();
        let evt = event(
            "evt_1",
            BillingEventKind::SubscriptionUpdated(state("sub_1", SubscriptionStatus::Active)),
        );
        f.engine.reconcile(&evt).await.unwrap();

        let second = f.engine.reconcile(&evt).await.unwrap();

        assert!(!second.applied);
        assert_eq!(f.store.writes.load(Ordering::SeqCst), 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoice Refresh
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_invoice_refreshes_from_provider() {
        let mut source = MockSource::default();
        source.subscriptions.insert(
            "sub_1".to_string(),
            state("sub_1", SubscriptionStatus::Active),
        );
        let f = fixture_with_source(source);

        let result = f
            .engine
            .reconcile(&event(
                "evt_inv",
                BillingEventKind::InvoicePaid(InvoiceRef {
                    invoice_id: "in_1".to_string(),
                    subscription_id: Some(SubscriptionId::new("sub_1").unwrap()),
                }),
            ))
            .await
            .unwrap();

        assert!(result.applied);
        assert_eq!(result.new_status, Some(SubscriptionStatus::Active));
    }

    #[tokio::test]
    async fn paid_invoice_without_subscription_changes_nothing() {
        let f = fixture();

        let result = f
            .engine
            .reconcile(&event(
                "evt_inv",
                BillingEventKind::InvoicePaid(InvoiceRef {
                    invoice_id: "in_1".to_string(),
                    subscription_id: None,
                }),
            ))
            .await
            .unwrap();

        assert!(!result.applied);
        assert_eq!(result.account_id, Some(f.account_id));
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn paid_invoice_for_unknown_subscription_changes_nothing() {
        let f = fixture();

        let result = f
            .engine
            .reconcile(&event(
                "evt_inv",
                BillingEventKind::InvoicePaid(InvoiceRef {
                    invoice_id: "in_1".to_string(),
                    subscription_id: Some(SubscriptionId::new("sub_gone").unwrap()),
                }),
            ))
            .await
            .unwrap();

        assert!(!result.applied);
        assert!(f.store.snapshot(&f.account_id).is_none());
    }

    #[tokio::test]
    async fn provider_outage_is_transient() {
        let f = fixture_with_source(MockSource {
            offline: true,
            ..Default::default()
        });

        let err = f
            .engine
            .reconcile(&event(
                "evt_inv",
                BillingEventKind::InvoicePaid(InvoiceRef {
                    invoice_id: "in_1".to_string(),
                    subscription_id: Some(SubscriptionId::new("sub_1").unwrap()),
                }),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconciliationError::ProviderUnavailable(_)));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // No-op Kinds And Lookup Misses
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn observability_kinds_never_touch_store() {
        let f = fixture();
        let payment = PaymentRef {
            payment_intent_id: "pi_1".to_string(),
            amount: Some(500),
            currency: Some("eur".to_string()),
        };

        for kind in [
            BillingEventKind::PaymentSucceeded(payment.clone()),
            BillingEventKind::PaymentFailed(payment),
            BillingEventKind::InvoiceFailed(InvoiceRef {
                invoice_id: "in_1".to_string(),
                subscription_id: None,
            }),
            BillingEventKind::Unhandled {
                event_type: "charge.refunded".to_string(),
            },
        ] {
            let result = f.engine.reconcile(&event("evt_x", kind)).await.unwrap();
            assert!(!result.applied);
        }

        assert_eq!(f.store.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_customer_is_acknowledged_without_change() {
        let f = fixture();
        let mut evt = deleted("evt_1");
        evt.subject_customer_id = Some(CustomerId::new("cus_stranger").unwrap());

        let result = f.engine.reconcile(&evt).await.unwrap();

        assert!(!result.applied);
        assert!(result.account_id.is_none());
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Handling
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn store_failures_within_budget_are_retried() {
        let f = fixture();
        f.store.load_failures.store(2, Ordering::SeqCst);

        let result = f.engine.reconcile(&deleted("evt_1")).await.unwrap();

        assert!(result.applied);
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unreachable_store_surfaces_transient_error() {
        let f = fixture();
        f.store.load_failures.store(u32::MAX, Ordering::SeqCst);

        let err = f.engine.reconcile(&deleted("evt_3")).await.unwrap_err();

        match err {
            ReconciliationError::TransientStore { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(f.store.snapshot(&f.account_id).is_none());
    }

    #[tokio::test]
    async fn directory_outage_is_retried_then_surfaced() {
        let f = fixture();
        f.directory.failures.store(5, Ordering::SeqCst);

        let err = f.engine.reconcile(&deleted("evt_1")).await.unwrap_err();

        assert!(matches!(err, ReconciliationError::TransientStore { .. }));
    }

    #[tokio::test]
    async fn version_conflict_reloads_and_retries() {
        let f = fixture();
        f.store.forced_conflicts.store(1, Ordering::SeqCst);

        let result = f.engine.reconcile(&deleted("evt_1")).await.unwrap();

        assert!(result.applied);
        assert_eq!(f.store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_contention_is_reported() {
        let f = fixture();
        f.store.forced_conflicts.store(u32::MAX, Ordering::SeqCst);

        let err = f.engine.reconcile(&deleted("evt_1")).await.unwrap_err();

        assert!(matches!(
            err,
            ReconciliationError::ContentionExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_events_for_same_account_do_not_lose_updates() {
        let f = fixture();
        let engine = Arc::new(f.engine);

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .reconcile(&event(
                        "evt_a",
                        BillingEventKind::SubscriptionUpdated(state(
                            "sub_1",
                            SubscriptionStatus::Active,
                        )),
                    ))
                    .await
            })
        };
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.reconcile(&deleted("evt_b")).await })
        };

        assert!(first.await.unwrap().unwrap().applied);
        assert!(second.await.unwrap().unwrap().applied);
        assert_eq!(f.store.snapshot(&f.account_id).unwrap().version, 2);
    }

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    }

    #[test]
    fn retry_policy_always_allows_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
