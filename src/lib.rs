//! Billing Reconciler - Stripe webhook reconciliation service
//!
//! Verifies and normalizes billing webhooks, admits each event exactly once
//! through an idempotency ledger, and folds it into the per-account
//! subscription snapshot that gates access to paid features.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
