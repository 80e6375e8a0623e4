//! Rate-limit window storage backends.
//!
//! Both implementations follow the same sequence for a check: prune
//! instants older than `now − window`, compare the pruned count against
//! the limit, and append the current instant only when admitting. The
//! retry hint on denial is `window − age(oldest remaining instant)`,
//! rounded up to whole seconds.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::{PgPool, Row};

use crate::error::BackendError;
use crate::limiter::RateDecision;

/// Storage contract for sliding-window counters.
///
/// Implementations must agree numerically: the same call sequence against
/// either backend yields the same decisions, counts, and retry hints.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Prune, count, and — when admitting — record the current instant.
    async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, BackendError>;

    /// Pruned count for a key without consuming a slot.
    async fn usage(&self, key: &str, window: Duration) -> Result<u32, BackendError>;

    /// Drop every window whose key starts with `prefix`.
    async fn reset_prefix(&self, prefix: &str) -> Result<(), BackendError>;
}

/// Seconds until the oldest remaining instant ages out of the window,
/// rounded up, floored at zero.
pub(crate) fn retry_after_secs(window: Duration, oldest_age: Duration) -> u64 {
    let remaining = window.saturating_sub(oldest_age);
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// In-process windows, one ordered list of instants per key.
///
/// One mutex over the whole map: critical sections are a prune plus a
/// push, far too short to contend with anything the workers do.
#[derive(Debug, Default)]
pub struct MemoryRateLimitBackend {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl MemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for MemoryRateLimitBackend {
    async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, BackendError> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let instants = windows.entry(key.to_owned()).or_default();
        instants.retain(|requested| now.duration_since(*requested) < window);

        let current = instants.len() as u32;
        if current >= max_requests {
            // Instants are appended in order, so the front is the oldest.
            let oldest_age = instants
                .first()
                .map(|oldest| now.duration_since(*oldest))
                .unwrap_or_default();
            return Ok(RateDecision {
                allowed: false,
                retry_after_secs: retry_after_secs(window, oldest_age),
                current_count: current,
            });
        }

        instants.push(now);
        Ok(RateDecision {
            allowed: true,
            retry_after_secs: 0,
            current_count: current + 1,
        })
    }

    async fn usage(&self, key: &str, window: Duration) -> Result<u32, BackendError> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let Some(instants) = windows.get_mut(key) else {
            return Ok(0);
        };
        instants.retain(|requested| now.duration_since(*requested) < window);
        let count = instants.len() as u32;
        if count == 0 {
            windows.remove(key);
        }
        Ok(count)
    }

    async fn reset_prefix(&self, prefix: &str) -> Result<(), BackendError> {
        self.windows.lock().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

/// Shared windows in a Postgres table, one row per admitted request.
///
/// Prune, count, and insert run inside a single transaction so concurrent
/// instances observe a consistent window.
#[derive(Debug, Clone)]
pub struct PostgresRateLimitBackend {
    pool: PgPool,
}

impl PostgresRateLimitBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table when it does not exist yet.
    pub async fn migrate(&self) -> Result<(), BackendError> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS rate_limit_events (
                bucket_key TEXT NOT NULL,
                requested_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r"CREATE INDEX IF NOT EXISTS rate_limit_events_key_idx
                ON rate_limit_events (bucket_key, requested_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitBackend for PostgresRateLimitBackend {
    async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, BackendError> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rate_limit_events WHERE bucket_key = $1 AND requested_at < $2")
            .bind(key)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS current, MIN(requested_at) AS oldest
               FROM rate_limit_events WHERE bucket_key = $1",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        let current: i64 = row.get("current");
        let oldest: Option<chrono::DateTime<Utc>> = row.get("oldest");

        if current >= i64::from(max_requests) {
            tx.commit().await?;
            let oldest_age = oldest
                .and_then(|oldest| (now - oldest).to_std().ok())
                .unwrap_or_default();
            return Ok(RateDecision {
                allowed: false,
                retry_after_secs: retry_after_secs(window, oldest_age),
                current_count: current as u32,
            });
        }

        sqlx::query("INSERT INTO rate_limit_events (bucket_key, requested_at) VALUES ($1, $2)")
            .bind(key)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RateDecision {
            allowed: true,
            retry_after_secs: 0,
            current_count: current as u32 + 1,
        })
    }

    async fn usage(&self, key: &str, window: Duration) -> Result<u32, BackendError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));

        sqlx::query("DELETE FROM rate_limit_events WHERE bucket_key = $1 AND requested_at < $2")
            .bind(key)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT COUNT(*) AS current FROM rate_limit_events WHERE bucket_key = $1")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        let current: i64 = row.get("current");
        Ok(current as u32)
    }

    async fn reset_prefix(&self, prefix: &str) -> Result<(), BackendError> {
        // LIKE treats % and _ as wildcards; escape them so a literal
        // subject cannot widen the delete.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        sqlx::query("DELETE FROM rate_limit_events WHERE bucket_key LIKE $1 ESCAPE '\\'")
            .bind(format!("{escaped}%"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
