//! PostgreSQL adapters - Database implementations for the billing ports.
//!
//! - `PostgresIdempotencyLedger` - Claim/complete ledger on a unique event id
//! - `PostgresAccountStateStore` - Versioned snapshots with compare-and-swap
//! - `PostgresAccountDirectory` - Customer id lookups against `accounts`

mod account_directory;
mod account_state_store;
mod idempotency_ledger;

pub use account_directory::PostgresAccountDirectory;
pub use account_state_store::PostgresAccountStateStore;
pub use idempotency_ledger::PostgresIdempotencyLedger;

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    tracing::info!("Running database migrations");
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations complete");
    Ok(())
}
