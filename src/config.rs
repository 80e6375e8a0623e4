//! # Configuration
//!
//! Typed configuration for every core component, chosen once at
//! construction. Backend selection is explicit (`BackendConfig`): the
//! embedding application decides between the in-process and shared-store
//! implementations when it builds the [`crate::context::CoreContext`],
//! instead of components probing their environment at call time.

use std::time::Duration;

use sqlx::PgPool;

use crate::constants;

/// Configuration for the [`crate::jobs::JobQueue`] worker pool.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Number of worker loops. Zero is legal: jobs accumulate as pending
    /// and nothing executes, which drain-only deployments and tests use.
    pub workers: usize,

    /// How long a worker blocks waiting for the next job id before
    /// re-checking for shutdown.
    pub poll_interval: Duration,

    /// Upper bound on how long `shutdown()` waits for workers to exit.
    pub shutdown_grace: Duration,

    /// Terminal jobs older than this are eligible for cleanup.
    pub retention: Duration,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            workers: constants::DEFAULT_WORKER_COUNT,
            poll_interval: constants::DEFAULT_POLL_INTERVAL,
            shutdown_grace: constants::DEFAULT_SHUTDOWN_GRACE,
            retention: constants::DEFAULT_JOB_RETENTION,
        }
    }
}

impl JobQueueConfig {
    /// Defaults with the worker count taken from `DRAFTMILL_JOB_WORKERS`
    /// when set and parseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(constants::ENV_WORKER_COUNT) {
            match raw.parse::<usize>() {
                Ok(workers) => config.workers = workers,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "ignoring unparseable {} override",
                    constants::ENV_WORKER_COUNT
                ),
            }
        }
        config
    }
}

/// Configuration for the [`crate::cache::CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for writes that do not go through a namespace helper.
    pub default_ttl: Duration,

    /// Interval between background sweeps of the in-memory backend.
    /// Ignored by the shared-store backend, which prunes via its native
    /// expiry predicate.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: constants::DEFAULT_CACHE_TTL,
            sweep_interval: constants::DEFAULT_CACHE_SWEEP_INTERVAL,
        }
    }
}

/// Backend selection for the cache and the rate limiter.
///
/// `Memory` keeps all state in-process; `Postgres` shares it across
/// processes through the given pool. Picked once, at construction.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// In-process maps, per-instance state.
    Memory,
    /// Shared store reachable by every instance of the application.
    Postgres(PgPool),
}

/// Top-level configuration consumed by [`crate::context::CoreContext::new`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub job_queue: JobQueueConfig,
    pub cache: CacheConfig,
    pub backend: BackendConfig,
    /// Progress records older than this are removed by periodic cleanup.
    pub progress_retention: Duration,
    /// How often the context runs its maintenance pass (old-job cleanup,
    /// stale-progress cleanup).
    pub maintenance_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            job_queue: JobQueueConfig::default(),
            cache: CacheConfig::default(),
            backend: BackendConfig::Memory,
            progress_retention: constants::DEFAULT_PROGRESS_RETENTION,
            maintenance_interval: constants::DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_boundaries() {
        let config = JobQueueConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.retention, Duration::from_secs(86_400));
    }

    #[test]
    fn worker_count_env_override() {
        std::env::set_var(constants::ENV_WORKER_COUNT, "7");
        let config = JobQueueConfig::from_env();
        assert_eq!(config.workers, 7);

        std::env::set_var(constants::ENV_WORKER_COUNT, "not-a-number");
        let config = JobQueueConfig::from_env();
        assert_eq!(config.workers, constants::DEFAULT_WORKER_COUNT);
        std::env::remove_var(constants::ENV_WORKER_COUNT);
    }
}
