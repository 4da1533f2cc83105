//! Payment provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Stripe credentials and webhook verification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Secret API key, used for subscription lookups
    pub stripe_api_key: SecretString,

    /// Webhook signing secret
    pub stripe_webhook_secret: SecretString,

    /// API base URL, overridable for test doubles
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Maximum accepted age of a webhook signature timestamp
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,

    /// Outbound API request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl PaymentConfig {
    /// Get outbound request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_test_")
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        if !api_key.starts_with("sk_") && !api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://")
        {
            return Err(ValidationError::InvalidStripeBaseUrl);
        }
        if self.signature_tolerance_secs <= 0 {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: SecretString::new(String::new()),
            stripe_webhook_secret: SecretString::new(String::new()),
            api_base_url: default_api_base_url(),
            signature_tolerance_secs: default_signature_tolerance(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_signature_tolerance() -> i64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: SecretString::new("sk_test_abcd1234".to_string()),
            stripe_webhook_secret: SecretString::new("whsec_xyz789".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid();
        assert!(config.validate().is_ok());
        assert!(config.is_test_mode());
    }

    #[test]
    fn test_missing_webhook_secret_is_fatal() {
        let config = PaymentConfig {
            stripe_webhook_secret: SecretString::new(String::new()),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"))
        ));
    }

    #[test]
    fn test_invalid_webhook_secret_prefix() {
        let config = PaymentConfig {
            stripe_webhook_secret: SecretString::new("secret_xxx".to_string()),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        ));
    }

    #[test]
    fn test_publishable_key_rejected() {
        let config = PaymentConfig {
            stripe_api_key: SecretString::new("pk_test_xxx".to_string()),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        let config = PaymentConfig {
            signature_tolerance_secs: 0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("whsec_xyz789"));
        assert!(!rendered.contains("sk_test_abcd1234"));
    }
}
