//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    GetSubscriptionSnapshotHandler, GetSubscriptionSnapshotQuery, HandleBillingWebhookCommand,
    HandleBillingWebhookHandler,
};
use crate::domain::billing::{EventVerifier, ReconciliationEngine, WebhookError};
use crate::domain::foundation::{AccountId, DomainError};
use crate::ports::{AccountStateStore, IdempotencyLedger};

use super::dto::{ErrorResponse, SubscriptionSnapshotResponse, WebhookAck};

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped dependencies
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct BillingAppState {
    pub verifier: Arc<EventVerifier>,
    pub ledger: Arc<dyn IdempotencyLedger>,
    pub engine: Arc<ReconciliationEngine>,
    pub account_store: Arc<dyn AccountStateStore>,
    pub processing_deadline: Duration,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.verifier.clone(),
            self.ledger.clone(),
            self.engine.clone(),
            self.processing_deadline,
        )
    }

    pub fn snapshot_handler(&self) -> GetSubscriptionSnapshotHandler {
        GetSubscriptionSnapshotHandler::new(self.account_store.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/stripe/webhooks/stripe - Handle Stripe webhook events
///
/// The body is taken as raw bytes; signatures cover the exact bytes sent.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    state.webhook_handler().handle(cmd).await?;

    Ok(Json(WebhookAck::received()))
}

/// GET /api/accounts/:account_id/subscription - Current subscription snapshot
pub async fn get_subscription_snapshot(
    State(state): State<BillingAppState>,
    Path(account_id): Path<String>,
) -> Result<Json<SubscriptionSnapshotResponse>, SnapshotApiError> {
    let account_id: AccountId = account_id
        .parse()
        .map_err(|_| SnapshotApiError::InvalidAccountId)?;

    let snapshot = state
        .snapshot_handler()
        .handle(GetSubscriptionSnapshotQuery { account_id })
        .await?
        .ok_or(SnapshotApiError::NotFound)?;

    Ok(Json(SubscriptionSnapshotResponse::new(account_id, &snapshot)))
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Converts webhook failures into the provider-facing response.
///
/// Transient failures expose no internal detail; the provider only needs to
/// know it should retry.
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        let message = match &self.0 {
            WebhookError::Verification(err) => Some(err.detail.clone()),
            _ => None,
        };
        let body = WebhookAck::rejected(self.0.public_reason(), message);
        (status, Json(body)).into_response()
    }
}

/// Errors for the snapshot read endpoint.
pub enum SnapshotApiError {
    InvalidAccountId,
    NotFound,
    Internal(DomainError),
}

impl From<DomainError> for SnapshotApiError {
    fn from(err: DomainError) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for SnapshotApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            SnapshotApiError::InvalidAccountId => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_message("invalid_account_id", "Account id must be a UUID"),
            ),
            SnapshotApiError::NotFound => (StatusCode::NOT_FOUND, ErrorResponse::new("not_found")),
            SnapshotApiError::Internal(err) => {
                tracing::error!(error = %err, "Snapshot lookup failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new("temporarily_unavailable"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
