//! Redis-backed idempotency ledger for multi-instance deployments that want
//! to keep ledger traffic off Postgres.
//!
//! Each event id maps to one string key:
//!
//! - `<claimed_at>` while claimed, with a TTL equal to the claim lease
//! - `<claimed_at>:<processed_at>` once processed, with a TTL equal to the
//!   retention window
//!
//! Timestamps are unix seconds. Expiry replaces both stale-claim takeover and
//! purging, so `purge_before` has nothing to do.
//!
//! Connecting and every command are bounded by `command_timeout`, so an
//! unresponsive Redis surfaces as a `CacheError` instead of a stalled delivery.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use redis::Script;

use crate::domain::foundation::{DomainError, ErrorCode, EventId};
use crate::ports::{Admission, IdempotencyLedger, IdempotencyRecord};

const KEY_PREFIX: &str = "billing:idempotency:";

/// Deletes the key only while it still holds a bare claim.
const RELEASE_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if value and not string.find(value, ':', 1, true) then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisIdempotencyLedger {
    conn: MultiplexedConnection,
    claim_lease: Duration,
    retention: Duration,
    command_timeout: std::time::Duration,
}

impl RedisIdempotencyLedger {
    pub fn new(
        conn: MultiplexedConnection,
        claim_lease: Duration,
        retention: Duration,
        command_timeout: std::time::Duration,
    ) -> Self {
        Self {
            conn,
            claim_lease,
            retention,
            command_timeout,
        }
    }

    /// Open a multiplexed connection to `url` within `command_timeout`.
    pub async fn connect(
        url: &str,
        command_timeout: std::time::Duration,
        claim_lease: Duration,
        retention: Duration,
    ) -> Result<Self, DomainError> {
        let client =
            redis::Client::open(url).map_err(|e| cache_error("Invalid Redis URL", e))?;
        let conn = bounded(
            command_timeout,
            "Failed to connect to Redis",
            client.get_multiplexed_tokio_connection(),
        )
        .await?;

        tracing::info!(timeout_ms = command_timeout.as_millis() as u64, "Connected to Redis ledger");
        Ok(Self::new(conn, claim_lease, retention, command_timeout))
    }

    fn key(event_id: &EventId) -> String {
        format!("{}{}", KEY_PREFIX, event_id)
    }
}

fn cache_error(context: &str, err: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("{}: {}", context, err))
}

/// Run a Redis future, failing with `CacheError` once `limit` elapses.
async fn bounded<T, F>(
    limit: std::time::Duration,
    context: &str,
    fut: F,
) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, redis::RedisError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(|e| cache_error(context, e)),
        Err(_) => Err(DomainError::new(
            ErrorCode::CacheError,
            format!("{}: timed out after {:?}", context, limit),
        )),
    }
}

fn ttl_secs(duration: Duration) -> u64 {
    duration.num_seconds().max(1) as u64
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn parse_record(event_id: &EventId, value: &str) -> Result<IdempotencyRecord, DomainError> {
    let malformed =
        || DomainError::new(ErrorCode::CacheError, format!("Malformed ledger entry: {}", value));

    let (claimed, processed) = match value.split_once(':') {
        Some((claimed, processed)) => (claimed, Some(processed)),
        None => (value, None),
    };

    Ok(IdempotencyRecord {
        event_id: event_id.clone(),
        claimed_at: parse_timestamp(claimed).ok_or_else(malformed)?,
        processed_at: match processed {
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(malformed)?),
            None => None,
        },
    })
}

#[async_trait]
impl IdempotencyLedger for RedisIdempotencyLedger {
    async fn admit(&self, event_id: &EventId) -> Result<Admission, DomainError> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = bounded(
            self.command_timeout,
            "Failed to claim event",
            redis::cmd("SET")
                .arg(Self::key(event_id))
                .arg(Utc::now().timestamp())
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs(self.claim_lease))
                .query_async(&mut conn),
        )
        .await?;

        Ok(match reply {
            Some(_) => Admission::Admitted,
            None => Admission::AlreadyProcessed,
        })
    }

    async fn complete(&self, event_id: &EventId) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let key = Self::key(event_id);
        let now = Utc::now().timestamp();

        let current: Option<String> = bounded(
            self.command_timeout,
            "Failed to read claim",
            redis::cmd("GET").arg(&key).query_async(&mut conn),
        )
        .await?;
        let claimed_at = current
            .as_deref()
            .and_then(|v| v.split(':').next())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(now);

        bounded(
            self.command_timeout,
            "Failed to complete event",
            redis::cmd("SET")
                .arg(&key)
                .arg(format!("{}:{}", claimed_at, now))
                .arg("EX")
                .arg(ttl_secs(self.retention))
                .query_async::<_, ()>(&mut conn),
        )
        .await?;

        Ok(())
    }

    async fn release(&self, event_id: &EventId) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();

        let script = Script::new(RELEASE_SCRIPT);
        bounded(
            self.command_timeout,
            "Failed to release claim",
            script.key(Self::key(event_id)).invoke_async::<_, i64>(&mut conn),
        )
        .await?;

        Ok(())
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<IdempotencyRecord>, DomainError> {
        let mut conn = self.conn.clone();

        let value: Option<String> = bounded(
            self.command_timeout,
            "Failed to find event",
            redis::cmd("GET").arg(Self::key(event_id)).query_async(&mut conn),
        )
        .await?;

        value.map(|v| parse_record(event_id, &v)).transpose()
    }

    async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        Ok(0)
    }
}

impl std::fmt::Debug for RedisIdempotencyLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisIdempotencyLedger")
            .field("claim_lease", &self.claim_lease)
            .field("retention", &self.retention)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}
