//! # System Constants
//!
//! Operational defaults for the worker pool, cache, limiter, and progress
//! tracker. Every value here can be overridden through the corresponding
//! configuration struct in [`crate::config`]; these are the boundaries the
//! system falls back to when the embedding application does not care.

use std::time::Duration;
use uuid::Uuid;

/// Number of worker loops started when no explicit count is configured.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// How long a worker blocks waiting for the next job id before re-checking
/// for shutdown. Keeps shutdown observable without busy-waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on how long `shutdown()` waits for workers to drain.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Terminal jobs older than this are removed by `cleanup_old_jobs`.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval between background sweeps of the in-memory cache backend.
pub const DEFAULT_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// TTL applied to cache writes that do not name a namespace.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Progress records older than this are removed by `ProgressTracker::cleanup`.
pub const DEFAULT_PROGRESS_RETENTION: Duration = Duration::from_secs(3600);

/// Interval between the context's maintenance passes (old-job cleanup and
/// stale-progress cleanup).
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Per-namespace cache TTLs. Immutable source material lives long; raw
/// model replies are ephemeral.
pub mod cache_ttl {
    use std::time::Duration;

    /// Fetched source transcripts never change for a given identifier.
    pub const SOURCE_TRANSCRIPT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    /// Rendered articles may be regenerated; keep for a day.
    pub const RENDERED_ARTICLE: Duration = Duration::from_secs(24 * 60 * 60);
    /// Generated media is expensive to reproduce.
    pub const GENERATED_IMAGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    /// Raw model replies go stale quickly.
    pub const MODEL_REPLY: Duration = Duration::from_secs(3600);
}

/// Namespace UUID under which cache identifiers are hashed (uuid v5).
/// Stable across processes so cache keys survive restarts of the
/// embedding application.
pub const CACHE_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_4c2a_9d3e_4f58_8a07_52c1e9b0d4a6);

/// Environment variable overriding the worker count.
pub const ENV_WORKER_COUNT: &str = "DRAFTMILL_JOB_WORKERS";

/// Environment variable selecting the log filter.
pub const ENV_LOG_FILTER: &str = "DRAFTMILL_LOG";

/// Environment variable switching log output to JSON.
pub const ENV_LOG_FORMAT: &str = "DRAFTMILL_LOG_FORMAT";
