//! # Core Context
//!
//! One explicit container for the four core components, constructed once
//! at application startup and passed into every handler and worker. This
//! replaces hidden process-wide singletons: tests build a fresh context
//! per case, and nothing reaches for global state behind the caller's
//! back.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{CacheManager, MemoryCacheBackend, PostgresCacheBackend};
use crate::config::{BackendConfig, CoreConfig};
use crate::jobs::JobQueue;
use crate::limiter::{MemoryRateLimitBackend, PostgresRateLimitBackend, RateLimiter};
use crate::progress::ProgressTracker;

/// The assembled core: job queue, rate limiter, cache, progress tracker.
///
/// Cheap to clone; all components are shared behind `Arc`s.
#[derive(Clone)]
pub struct CoreContext {
    job_queue: Arc<JobQueue>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<CacheManager>,
    progress: Arc<ProgressTracker>,
    maintenance: Arc<JoinHandle<()>>,
}

impl CoreContext {
    /// Build every component from one configuration. Backend selection
    /// happens here, exactly once; must run inside a tokio runtime.
    pub fn new(config: CoreConfig) -> Self {
        let progress = Arc::new(ProgressTracker::new());

        let (cache, rate_limiter) = match &config.backend {
            BackendConfig::Memory => {
                info!("core context using in-memory backends");
                let cache_backend = Arc::new(MemoryCacheBackend::new());
                let sweeper =
                    MemoryCacheBackend::spawn_sweeper(&cache_backend, config.cache.sweep_interval);
                let cache = CacheManager::new(cache_backend, config.cache.default_ttl)
                    .with_sweeper(sweeper);
                let limiter = RateLimiter::new(Arc::new(MemoryRateLimitBackend::new()));
                (cache, limiter)
            }
            BackendConfig::Postgres(pool) => {
                info!("core context using shared Postgres backends");
                let cache = CacheManager::new(
                    Arc::new(PostgresCacheBackend::new(pool.clone())),
                    config.cache.default_ttl,
                );
                let limiter =
                    RateLimiter::new(Arc::new(PostgresRateLimitBackend::new(pool.clone())));
                (cache, limiter)
            }
        };

        let job_queue = Arc::new(JobQueue::start(
            config.job_queue,
            Some(Arc::clone(&progress)),
        ));
        let maintenance = spawn_maintenance(
            Arc::downgrade(&job_queue),
            Arc::downgrade(&progress),
            config.maintenance_interval,
            config.progress_retention,
        );

        Self {
            job_queue,
            rate_limiter: Arc::new(rate_limiter),
            cache: Arc::new(cache),
            progress,
            maintenance: Arc::new(maintenance),
        }
    }

    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.job_queue
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Stop the maintenance pass and the job queue's intake, then drain
    /// the workers.
    pub async fn shutdown(&self) {
        self.maintenance.abort();
        self.job_queue.shutdown().await;
    }
}

/// Periodic cleanup keeping the job table and progress map bounded.
///
/// Holds only weak references, so a context dropped without an explicit
/// shutdown still lets the task exit on its next tick.
fn spawn_maintenance(
    job_queue: std::sync::Weak<JobQueue>,
    progress: std::sync::Weak<ProgressTracker>,
    interval: std::time::Duration,
    progress_retention: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(job_queue) = job_queue.upgrade() else {
                break;
            };
            job_queue.cleanup_expired().await;
            if let Some(progress) = progress.upgrade() {
                progress.cleanup(progress_retention);
            }
        }
    })
}
