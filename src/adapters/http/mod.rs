//! HTTP adapters - REST API implementations.
//!
//! `app_router` assembles every route with the cross-cutting layers
//! (request ids, tracing, request timeout).

pub mod billing;

use std::time::Duration;

use axum::{body::Body, http::Request, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use billing::{billing_router, BillingAppState};

/// Build the complete application router.
///
/// # Routes
/// - `GET /health` - Liveness probe
/// - `/api/...` - Billing routes
pub fn app_router(state: BillingAppState, request_timeout: Duration) -> Router {
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/health", get(billing::handlers::health))
        .nest("/api", billing_router())
        .layer(layers)
        .with_state(state)
}
