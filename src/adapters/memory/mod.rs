//! In-memory adapters for tests and local runs without a database.
//!
//! Each adapter keeps the same atomicity guarantees as its production
//! counterpart: every operation holds a single `tokio::sync::Mutex` for its
//! whole read-modify-write, so concurrent callers observe the same outcomes
//! they would against Postgres or Redis.

mod account_directory;
mod account_state_store;
mod idempotency_ledger;
mod subscription_source;

pub use account_directory::InMemoryAccountDirectory;
pub use account_state_store::InMemoryAccountStateStore;
pub use idempotency_ledger::InMemoryIdempotencyLedger;
pub use subscription_source::InMemorySubscriptionSource;
