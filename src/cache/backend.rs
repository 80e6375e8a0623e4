//! Cache storage backends.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::BackendError;

/// Storage contract for TTL'd opaque values.
///
/// `get` must enforce expiry itself: an entry past its deadline is absent
/// no matter what periodic pruning has or has not run.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, BackendError>;
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), BackendError>;
    async fn delete(&self, key: &str) -> Result<(), BackendError>;
    async fn clear(&self) -> Result<(), BackendError>;

    /// Drop expired entries eagerly. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, BackendError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process cache over a concurrent map.
///
/// Reads are lock-free under `DashMap`; expiry is checked on every `get`
/// and a background sweeper started via [`spawn_sweeper`] keeps the map
/// from accumulating entries nobody reads again.
///
/// [`spawn_sweeper`]: MemoryCacheBackend::spawn_sweeper
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_now(&self) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        // Concurrent inserts during the retain can grow the map back.
        before.saturating_sub(self.entries.len()) as u64
    }

    /// Start the periodic sweep for this backend.
    ///
    /// The task holds only a `Weak` reference and exits on its own once
    /// the backend is dropped, so it never keeps the cache alive.
    pub fn spawn_sweeper(backend: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(backend);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh cache
            // is not swept before anything is written.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(backend) = weak.upgrade() else {
                    break;
                };
                let removed = backend.purge_now();
                if removed > 0 {
                    debug!(removed, "cache sweep removed expired entries");
                }
            }
            trace!("cache sweeper exiting, backend dropped");
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let hit = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired()).then(|| entry.value.clone()));
        match hit {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                // Expired: evict lazily. The predicate re-checks under the
                // shard lock so a concurrent overwrite is not lost.
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), BackendError> {
        self.entries.insert(
            key.to_owned(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.entries.clear();
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, BackendError> {
        Ok(self.purge_now())
    }
}

/// Shared cache in a Postgres table with an absolute expiry column.
///
/// Expiry is native to every query (`expires_at > now()`), so readers on
/// any instance agree on liveness without coordination; `purge_expired`
/// merely reclaims storage.
#[derive(Debug, Clone)]
pub struct PostgresCacheBackend {
    pool: PgPool,
}

impl PostgresCacheBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table when it does not exist yet.
    pub async fn migrate(&self) -> Result<(), BackendError> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY,
                payload JSONB NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r"CREATE INDEX IF NOT EXISTS cache_entries_expiry_idx
                ON cache_entries (expires_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for PostgresCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let row = sqlx::query(
            "SELECT payload FROM cache_entries WHERE cache_key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.get("payload")))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), BackendError> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        sqlx::query(
            r"INSERT INTO cache_entries (cache_key, payload, expires_at)
              VALUES ($1, $2, $3)
              ON CONFLICT (cache_key)
              DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM cache_entries WHERE cache_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, BackendError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k1", &json!({"title": "Sourdough at altitude"}), Duration::from_secs(60))
            .await
            .unwrap();

        let value = backend.get("k1").await.unwrap().unwrap();
        assert_eq!(value["title"], "Sourdough at altitude");
    }

    #[tokio::test]
    async fn expiry_is_enforced_on_read_before_any_sweep() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k1", &json!("v"), Duration::from_millis(40))
            .await
            .unwrap();

        assert!(backend.get("k1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        // No sweeper is running in this test; the read alone must miss.
        assert!(backend.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_refreshes_the_deadline() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k1", &json!(1), Duration::from_millis(40))
            .await
            .unwrap();
        backend
            .set("k1", &json!(2), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.get("k1").await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn delete_and_clear_remove_entries() {
        let backend = MemoryCacheBackend::new();
        backend.set("k1", &json!(1), Duration::from_secs(60)).await.unwrap();
        backend.set("k2", &json!(2), Duration::from_secs(60)).await.unwrap();

        backend.delete("k1").await.unwrap();
        assert!(backend.get("k1").await.unwrap().is_none());
        assert!(backend.get("k2").await.unwrap().is_some());

        backend.clear().await.unwrap();
        assert!(backend.get("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_counts_only_expired_entries() {
        let backend = MemoryCacheBackend::new();
        backend.set("stale", &json!(1), Duration::from_millis(20)).await.unwrap();
        backend.set("live", &json!(2), Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.purge_expired().await.unwrap(), 1);
        assert!(backend.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweeper_prunes_in_the_background() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let handle = MemoryCacheBackend::spawn_sweeper(&backend, Duration::from_millis(30));

        backend.set("stale", &json!(1), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        // Entry is gone from the map itself, not just masked by get().
        assert!(backend.entries.get("stale").is_none());

        handle.abort();
    }
}
