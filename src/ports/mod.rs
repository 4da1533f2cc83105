//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Reconciliation Ports
//!
//! - `IdempotencyLedger` - Claims event ids so each event is applied once
//! - `AccountStateStore` - Versioned per-account subscription snapshots
//! - `AccountDirectory` - Maps provider customers onto local accounts
//! - `SubscriptionSource` - Reads the provider's current subscription state

mod account_directory;
mod account_state_store;
mod idempotency_ledger;
mod subscription_source;

pub use account_directory::AccountDirectory;
pub use account_state_store::{AccountStateStore, CasOutcome};
pub use idempotency_ledger::{Admission, IdempotencyLedger, IdempotencyRecord};
pub use subscription_source::SubscriptionSource;
