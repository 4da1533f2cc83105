//! Stripe subscription lookups.
//!
//! Backs the `SubscriptionSource` port with `GET /v1/subscriptions/{id}`.
//! The response body is the same subscription object webhooks carry, so it
//! is mapped with the normalizer's subscription mapping.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::domain::billing::{subscription_state, SubscriptionState};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId};
use crate::ports::SubscriptionSource;

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Per-request timeout.
    request_timeout: Duration,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: "https://api.stripe.com".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Reads subscriptions from the Stripe API.
pub struct StripeSubscriptionClient {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeSubscriptionClient {
    pub fn new(config: StripeConfig) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }
}

fn provider_error(message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::ExternalServiceError, message)
}

#[async_trait]
impl SubscriptionSource for StripeSubscriptionClient {
    async fn fetch_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionState>, DomainError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_id
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| provider_error(format!("Stripe request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                subscription_id = %subscription_id,
                status = status.as_u16(),
                "Stripe subscription lookup failed"
            );
            return Err(provider_error(format!(
                "Stripe API error ({}): {}",
                status, error_text
            ))
            .with_detail("subscription_id", subscription_id.as_str()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| provider_error(format!("Failed to parse Stripe response: {}", e)))?;

        subscription_state(&body)
            .map(Some)
            .map_err(|e| provider_error(format!("Unusable Stripe subscription: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::SubscriptionStatus;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Server
    // ════════════════════════════════════════════════════════════════════════════

    async fn subscription_handler(
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("authorization").is_none() {
            return Err(StatusCode::UNAUTHORIZED);
        }
        match id.as_str() {
            "sub_active" => Ok(Json(json!({
                "id": "sub_active",
                "object": "subscription",
                "customer": "cus_1",
                "status": "active",
                "cancel_at_period_end": false,
                "current_period_end": 1_800_000_000,
                "trial_end": null
            }))),
            "sub_broken" => Err(StatusCode::INTERNAL_SERVER_ERROR),
            "sub_weird" => Ok(Json(json!({
                "id": "sub_weird",
                "customer": "cus_1",
                "status": "mystery"
            }))),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn spawn_stub() -> String {
        let app = Router::new().route("/v1/subscriptions/:id", get(subscription_handler));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn client() -> StripeSubscriptionClient {
        let config = StripeConfig::new(SecretString::new("sk_test_123".to_string()))
            .with_base_url(spawn_stub().await)
            .with_request_timeout(Duration::from_secs(2));
        StripeSubscriptionClient::new(config).unwrap()
    }

    fn sub(id: &str) -> SubscriptionId {
        SubscriptionId::new(id).unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Lookups
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn known_subscription_is_mapped() {
        let state = client()
            .await
            .fetch_subscription(&sub("sub_active"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state.status, SubscriptionStatus::Active);
        assert_eq!(state.current_period_end.unwrap().timestamp(), 1_800_000_000);
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let result = client().await.fetch_subscription(&sub("sub_missing")).await;
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_is_external_failure() {
        let err = client()
            .await
            .fetch_subscription(&sub("sub_broken"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalServiceError);
    }

    #[tokio::test]
    async fn unmappable_body_is_external_failure() {
        let err = client()
            .await
            .fetch_subscription(&sub("sub_weird"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalServiceError);
    }

    #[tokio::test]
    async fn unreachable_provider_is_external_failure() {
        let config = StripeConfig::new(SecretString::new("sk_test_123".to_string()))
            .with_base_url("http://127.0.0.1:9")
            .with_request_timeout(Duration::from_millis(500));
        let client = StripeSubscriptionClient::new(config).unwrap();

        let err = client.fetch_subscription(&sub("sub_active")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalServiceError);
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = StripeConfig::new(SecretString::new("sk_live_secret".to_string()));
        assert!(!format!("{:?}", config).contains("sk_live_secret"));
    }
}
