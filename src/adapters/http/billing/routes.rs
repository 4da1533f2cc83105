//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{get_subscription_snapshot, handle_stripe_webhook, BillingAppState};

/// Create the Stripe webhook router.
///
/// Webhooks carry no user authentication; they are verified by signature.
///
/// # Routes
/// - `POST /stripe` - Handle Stripe webhooks
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Account read routes.
///
/// # Routes
/// - `GET /:account_id/subscription` - Current subscription snapshot
pub fn account_routes() -> Router<BillingAppState> {
    Router::new().route("/:account_id/subscription", get(get_subscription_snapshot))
}

/// Create the complete billing router, suitable for mounting at `/api`.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", billing_router())
///     .with_state(app_state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/stripe/webhooks", webhook_routes())
        .nest("/accounts", account_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use crate::adapters::memory::{
        InMemoryAccountDirectory, InMemoryAccountStateStore, InMemoryIdempotencyLedger,
        InMemorySubscriptionSource,
    };
    use crate::domain::billing::{
        EventVerifier, ReconciliationEngine, RetryPolicy, SubscriptionSnapshot,
    };
    use crate::domain::foundation::AccountId;
    use crate::ports::AccountStateStore;

    fn state(store: Arc<InMemoryAccountStateStore>) -> BillingAppState {
        let engine = ReconciliationEngine::new(
            Arc::new(InMemoryAccountDirectory::new()),
            store.clone(),
            Arc::new(InMemorySubscriptionSource::new()),
            RetryPolicy::default(),
        );
        BillingAppState {
            verifier: Arc::new(EventVerifier::new(SecretString::new("whsec_x".to_string()))),
            ledger: Arc::new(InMemoryIdempotencyLedger::default()),
            engine: Arc::new(engine),
            account_store: store,
            processing_deadline: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn webhook_route_is_mounted() {
        let app = billing_router().with_state(state(Arc::new(InMemoryAccountStateStore::new())));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stripe/webhooks/stripe")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn snapshot_route_returns_stored_snapshot() {
        let store = Arc::new(InMemoryAccountStateStore::new());
        let account_id = AccountId::new();
        store
            .compare_and_swap(&account_id, None, &SubscriptionSnapshot::empty())
            .await
            .unwrap();
        let app = billing_router().with_state(state(store));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/accounts/{}/subscription", account_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn snapshot_route_rejects_non_uuid() {
        let app = billing_router().with_state(state(Arc::new(InMemoryAccountStateStore::new())));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/accounts/not-a-uuid/subscription")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_account_is_404() {
        let app = billing_router().with_state(state(Arc::new(InMemoryAccountStateStore::new())));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/accounts/{}/subscription", AccountId::new()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
