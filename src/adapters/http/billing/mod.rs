//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/stripe/webhooks/stripe` - Receive Stripe webhooks
//! - `GET /api/accounts/:account_id/subscription` - Read an account's snapshot

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingAppState, SIGNATURE_HEADER};
pub use routes::billing_router;
