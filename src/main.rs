//! Billing reconciler service entry point.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_reconciler::adapters::http::{app_router, BillingAppState};
use billing_reconciler::adapters::postgres::{
    run_migrations, PostgresAccountDirectory, PostgresAccountStateStore, PostgresIdempotencyLedger,
};
use billing_reconciler::adapters::redis::RedisIdempotencyLedger;
use billing_reconciler::adapters::stripe::{StripeConfig, StripeSubscriptionClient};
use billing_reconciler::application::{
    PurgeIdempotencyRecordsCommand, PurgeIdempotencyRecordsHandler,
};
use billing_reconciler::config::{AppConfig, ConfigError, LedgerBackend, ValidationError};
use billing_reconciler::domain::billing::{EventVerifier, ReconciliationEngine};
use billing_reconciler::domain::foundation::DomainError;
use billing_reconciler::ports::IdempotencyLedger;

/// Failures that stop the service before it starts serving.
#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load_validated() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("billing-reconciler: {}", err);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Service terminated");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    tracing::info!(
        database = %config.database.redacted_url(),
        ledger = ?config.reconciliation.ledger_backend,
        stripe_test_mode = config.payment.is_test_mode(),
        "Starting billing reconciler"
    );
    if config.is_production() && config.payment.is_test_mode() {
        tracing::warn!("Production environment is using a Stripe test-mode API key");
    }

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let reconciliation = &config.reconciliation;

    let ledger: Arc<dyn IdempotencyLedger> = match reconciliation.ledger_backend {
        LedgerBackend::Postgres => Arc::new(PostgresIdempotencyLedger::new(
            pool.clone(),
            reconciliation.claim_lease(),
        )),
        LedgerBackend::Redis => {
            let url = config
                .redis
                .url
                .as_deref()
                .ok_or(ValidationError::MissingRequired("REDIS_URL"))?;
            Arc::new(
                RedisIdempotencyLedger::connect(
                    url,
                    config.redis.timeout(),
                    reconciliation.claim_lease(),
                    reconciliation.retention(),
                )
                .await?,
            )
        }
    };

    let stripe = StripeSubscriptionClient::new(
        StripeConfig::new(config.payment.stripe_api_key.clone())
            .with_base_url(config.payment.api_base_url.clone())
            .with_request_timeout(config.payment.request_timeout()),
    )?;

    let account_store = Arc::new(PostgresAccountStateStore::new(pool.clone()));
    let engine = ReconciliationEngine::new(
        Arc::new(PostgresAccountDirectory::new(pool.clone())),
        account_store.clone(),
        Arc::new(stripe),
        reconciliation.retry_policy(),
    );

    let verifier = EventVerifier::new(config.payment.stripe_webhook_secret.clone())
        .with_tolerance_secs(config.payment.signature_tolerance_secs);

    let purge = Arc::new(PurgeIdempotencyRecordsHandler::new(ledger.clone()));
    tokio::spawn(purge.run_every(
        reconciliation.purge_interval(),
        PurgeIdempotencyRecordsCommand {
            retention: reconciliation.retention(),
        },
    ));

    let state = BillingAppState {
        verifier: Arc::new(verifier),
        ledger,
        engine: Arc::new(engine),
        account_store,
        processing_deadline: reconciliation.processing_deadline(),
    };

    let app = app_router(state, config.server.request_timeout());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Billing reconciler listening at {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_grace()))
        .await?;

    tracing::info!("Billing reconciler stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, after holding `grace` so load balancers
/// can drain traffic before the listener closes.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    tokio::time::sleep(grace).await;
}
