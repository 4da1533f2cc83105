//! HandleBillingWebhookHandler - Command handler for inbound billing webhooks.
//!
//! ## Pipeline
//!
//! 1. Verify the signature and parse the envelope (reject on failure)
//! 2. Normalize into a `BillingEvent` (acknowledge on failure)
//! 3. Claim the event id in the idempotency ledger
//! 4. Reconcile the account snapshot
//! 5. Mark the claim processed
//!
//! Steps 3 to 5 run under one processing deadline.
//!
//! ## Failure Handling
//!
//! Any transient failure after step 3 releases the claim before returning,
//! so the provider's redelivery is admitted again. A failed release is
//! logged; the claim lease expires on its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::domain::billing::{
    normalize, BillingEvent, EventVerifier, NormalizationError, ReconciliationEngine,
    ReconciliationResult, WebhookError,
};
use crate::domain::foundation::EventId;
use crate::ports::{Admission, IdempotencyLedger};

/// Command to handle one webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header, if present.
    pub signature: Option<String>,
}

/// What happened to an acknowledged delivery.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// Event was admitted and reconciled.
    Reconciled {
        event_id: EventId,
        result: ReconciliationResult,
    },
    /// Event was already processed or is in flight elsewhere.
    Duplicate { event_id: EventId },
    /// Authentic event the pipeline cannot use. Acknowledged so the provider
    /// stops redelivering it.
    Rejected {
        event_id: String,
        error: NormalizationError,
    },
}

/// Handler for billing webhook deliveries.
pub struct HandleBillingWebhookHandler {
    verifier: Arc<EventVerifier>,
    ledger: Arc<dyn IdempotencyLedger>,
    engine: Arc<ReconciliationEngine>,
    deadline: Duration,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        verifier: Arc<EventVerifier>,
        ledger: Arc<dyn IdempotencyLedger>,
        engine: Arc<ReconciliationEngine>,
        deadline: Duration,
    ) -> Self {
        Self {
            verifier,
            ledger,
            engine,
            deadline,
        }
    }

    /// Process one delivery.
    ///
    /// # Returns
    ///
    /// - `Ok(outcome)` - acknowledge the delivery
    /// - `Err(WebhookError::Verification)` - reject, never retry
    /// - `Err(_)` otherwise - do not acknowledge; the provider will redeliver
    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<WebhookOutcome, WebhookError> {
        let provider_event = self
            .verifier
            .verify(&cmd.payload, cmd.signature.as_deref())
            .map_err(|err| {
                tracing::warn!(reason = %err.reason, detail = %err.detail, "Webhook verification failed");
                err
            })?;

        let event = match normalize(&provider_event) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(
                    event_id = %provider_event.id,
                    event_type = %provider_event.event_type,
                    reason = %error.reason,
                    detail = %error.detail,
                    "Webhook event could not be normalized; acknowledging"
                );
                return Ok(WebhookOutcome::Rejected {
                    event_id: provider_event.id,
                    error,
                });
            }
        };

        let mut claimed = false;
        let processed = timeout(self.deadline, self.process(&event, &mut claimed)).await;

        let result = match processed {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    event_id = %event.id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Webhook processing exceeded deadline"
                );
                Err(WebhookError::DeadlineExceeded(self.deadline))
            }
        };

        if result.is_err() && claimed {
            self.release_claim(&event.id).await;
        }
        result
    }

    async fn process(
        &self,
        event: &BillingEvent,
        claimed: &mut bool,
    ) -> Result<WebhookOutcome, WebhookError> {
        let admission = self
            .ledger
            .admit(&event.id)
            .await
            .map_err(WebhookError::LedgerUnavailable)?;

        if admission == Admission::AlreadyProcessed {
            tracing::debug!(event_id = %event.id, kind = event.kind.name(), "Duplicate delivery skipped");
            return Ok(WebhookOutcome::Duplicate {
                event_id: event.id.clone(),
            });
        }
        *claimed = true;

        let result = self.engine.reconcile(event).await?;

        // The snapshot is already written; a lost completion only means a
        // redelivery re-applies the same wholesale replace.
        if let Err(err) = self.ledger.complete(&event.id).await {
            tracing::warn!(
                event_id = %event.id,
                error = %err,
                "Failed to mark event processed; claim will lapse"
            );
        }

        Ok(WebhookOutcome::Reconciled {
            event_id: event.id.clone(),
            result,
        })
    }

    async fn release_claim(&self, event_id: &EventId) {
        if let Err(err) = self.ledger.release(event_id).await {
            tracing::error!(
                event_id = %event_id,
                error = %err,
                "Failed to release claim; redelivery waits for lease expiry"
            );
        }
    }
}
