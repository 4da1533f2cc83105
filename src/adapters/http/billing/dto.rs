//! Request and response DTOs for billing endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::billing::{SubscriptionStatus, VersionedSnapshot};
use crate::domain::foundation::AccountId;

/// Body returned to the provider for every delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self {
            received: true,
            error: None,
            message: None,
        }
    }

    pub fn rejected(error: impl Into<String>, message: Option<String>) -> Self {
        Self {
            received: false,
            error: Some(error.into()),
            message,
        }
    }
}

/// Current subscription snapshot of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshotResponse {
    pub account_id: AccountId,
    pub subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub has_access: bool,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<DateTime<Utc>>,
    pub last_applied_event_id: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionSnapshotResponse {
    pub fn new(account_id: AccountId, versioned: &VersionedSnapshot) -> Self {
        let snapshot = &versioned.snapshot;
        Self {
            account_id,
            subscription_id: snapshot.subscription_id().map(|s| s.to_string()),
            status: snapshot.status(),
            has_access: snapshot.status().has_access(),
            current_period_end: snapshot.current_period_end(),
            cancel_at_period_end: snapshot.cancel_at_period_end(),
            trial_end: snapshot.trial_end(),
            last_applied_event_id: snapshot.last_applied_event_id().map(|e| e.to_string()),
            version: versioned.version,
            updated_at: versioned.updated_at,
        }
    }
}

/// Error body for the read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}
