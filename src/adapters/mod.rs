//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum routes for webhooks and snapshot reads
//! - `memory` - In-process implementations for tests and local runs
//! - `postgres` - Durable ledger, snapshot store and account directory
//! - `redis` - Alternative idempotency ledger backed by `SET NX`
//! - `stripe` - Provider subscription lookups

pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod stripe;
