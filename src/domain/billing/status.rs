//! Local subscription status.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::NormalizationError;

/// Status of an account's subscription as last reconciled from the provider.
///
/// `None` means the account has never had a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    /// Maps a provider status string onto the local status set.
    ///
    /// The provider has a few statuses with no local counterpart; those fold
    /// into the closest local state.
    pub fn from_provider(status: &str) -> Result<Self, NormalizationError> {
        match status {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "past_due" | "unpaid" | "paused" => Ok(SubscriptionStatus::PastDue),
            "canceled" | "incomplete_expired" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            other => Err(NormalizationError::unrecognized_status(other)),
        }
    }

    /// Parses the stored representation produced by [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SubscriptionStatus::None),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Returns true if this status grants access to paid features.
    pub fn has_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::errors::NormalizationReason;

    #[test]
    fn maps_direct_provider_statuses() {
        assert_eq!(
            SubscriptionStatus::from_provider("active").unwrap(),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("trialing").unwrap(),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete").unwrap(),
            SubscriptionStatus::Incomplete
        );
    }

    #[test]
    fn folds_provider_only_statuses() {
        assert_eq!(
            SubscriptionStatus::from_provider("unpaid").unwrap(),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_provider("paused").unwrap(),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired").unwrap(),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn rejects_unknown_provider_status() {
        let err = SubscriptionStatus::from_provider("frozen").unwrap_err();
        assert_eq!(err.reason, NormalizationReason::UnrecognizedStatus);
    }

    #[test]
    fn stored_form_round_trips() {
        for status in [
            SubscriptionStatus::None,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Incomplete,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn only_active_and_trialing_grant_access() {
        assert!(SubscriptionStatus::Active.has_access());
        assert!(SubscriptionStatus::Trialing.has_access());
        assert!(!SubscriptionStatus::PastDue.has_access());
        assert!(!SubscriptionStatus::Canceled.has_access());
    }
}
