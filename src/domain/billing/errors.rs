//! Error taxonomy for the billing webhook pipeline.
//!
//! - `VerificationError`: forged or malformed delivery, rejected with a 4xx
//! - `NormalizationError`: authentic but unusable event, acknowledged
//! - `ReconciliationError`: transient backend failure, never acknowledged
//! - `WebhookError`: what the HTTP boundary maps to a status code

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::domain::foundation::{AccountId, DomainError};

// ════════════════════════════════════════════════════════════════════════════════
// Verification
// ════════════════════════════════════════════════════════════════════════════════

/// Why a delivery failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    MissingSignature,
    BadSignature,
    MalformedPayload,
}

impl VerificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationReason::MissingSignature => "missing_signature",
            VerificationReason::BadSignature => "bad_signature",
            VerificationReason::MalformedPayload => "malformed_payload",
        }
    }
}

impl fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery that cannot be trusted. Never retried, never partially used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("webhook verification failed ({reason}): {detail}")]
pub struct VerificationError {
    pub reason: VerificationReason,
    pub detail: String,
}

impl VerificationError {
    pub fn missing_signature(detail: impl Into<String>) -> Self {
        Self {
            reason: VerificationReason::MissingSignature,
            detail: detail.into(),
        }
    }

    pub fn bad_signature(detail: impl Into<String>) -> Self {
        Self {
            reason: VerificationReason::BadSignature,
            detail: detail.into(),
        }
    }

    pub fn malformed_payload(detail: impl Into<String>) -> Self {
        Self {
            reason: VerificationReason::MalformedPayload,
            detail: detail.into(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Normalization
// ════════════════════════════════════════════════════════════════════════════════

/// Why an authentic event could not be mapped to a `BillingEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationReason {
    /// No customer or subscription identifier for a kind that needs one.
    MissingSubject,
    /// Subscription status string outside the known set.
    UnrecognizedStatus,
    /// A field is present but has the wrong shape.
    InvalidField,
}

impl NormalizationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationReason::MissingSubject => "missing_subject",
            NormalizationReason::UnrecognizedStatus => "unrecognized_status",
            NormalizationReason::InvalidField => "invalid_field",
        }
    }
}

impl fmt::Display for NormalizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot normalize event ({reason}): {detail}")]
pub struct NormalizationError {
    pub reason: NormalizationReason,
    pub detail: String,
}

impl NormalizationError {
    pub fn missing_subject(detail: impl Into<String>) -> Self {
        Self {
            reason: NormalizationReason::MissingSubject,
            detail: detail.into(),
        }
    }

    pub fn unrecognized_status(status: &str) -> Self {
        Self {
            reason: NormalizationReason::UnrecognizedStatus,
            detail: format!("unknown subscription status '{}'", status),
        }
    }

    pub fn invalid_field(field: &'static str) -> Self {
        Self {
            reason: NormalizationReason::InvalidField,
            detail: format!("field '{}' has an unexpected type", field),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Reconciliation
// ════════════════════════════════════════════════════════════════════════════════

/// Failures that leave the event unapplied. Every variant means the delivery
/// must not be acknowledged so the provider redelivers it later.
#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("account store unavailable after {attempts} attempts: {source}")]
    TransientStore { attempts: u32, source: DomainError },

    #[error("subscription lookup at provider failed: {0}")]
    ProviderUnavailable(DomainError),

    #[error("snapshot for account {account_id} kept changing after {attempts} attempts")]
    ContentionExhausted { account_id: AccountId, attempts: u32 },
}

// ════════════════════════════════════════════════════════════════════════════════
// Boundary
// ════════════════════════════════════════════════════════════════════════════════

/// Errors surfaced to the HTTP boundary by the webhook handler.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error("idempotency ledger unavailable: {0}")]
    LedgerUnavailable(DomainError),

    #[error("processing exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl WebhookError {
    /// Whether the provider should redeliver this event.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WebhookError::Verification(_))
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Verification(err) => match err.reason {
                VerificationReason::MissingSignature | VerificationReason::BadSignature => {
                    StatusCode::UNAUTHORIZED
                }
                VerificationReason::MalformedPayload => StatusCode::BAD_REQUEST,
            },
            WebhookError::Reconciliation(_)
            | WebhookError::LedgerUnavailable(_)
            | WebhookError::DeadlineExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Reason string that is safe to echo to the provider.
    pub fn public_reason(&self) -> &'static str {
        match self {
            WebhookError::Verification(err) => err.reason.as_str(),
            _ => "temporarily_unavailable",
        }
    }
}
