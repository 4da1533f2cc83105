//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, errors)
//! - `billing` - Provider events, subscription snapshots and reconciliation

pub mod billing;
pub mod foundation;
