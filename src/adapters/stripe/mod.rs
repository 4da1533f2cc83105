//! Stripe adapter.
//!
//! Implements the `SubscriptionSource` port against the Stripe REST API.
//! Webhook verification lives in the domain (`EventVerifier`) because it
//! needs no I/O.
//!
//! # Security
//!
//! - The secret API key is held in `secrecy::SecretString` and never logged

mod subscription_client;

pub use subscription_client::{StripeConfig, StripeSubscriptionClient};
