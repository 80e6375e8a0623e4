//! # Rate Limiter
//!
//! Sliding-window admission control keyed by (subject, action). A check
//! prunes request instants older than the trailing window, denies when the
//! pruned count has reached the limit, and only records the instant when
//! the request is admitted — a denial never consumes a slot.
//!
//! Two backends satisfy one contract with identical numeric semantics:
//! an in-process map for single-instance deployments and a shared
//! Postgres table when several instances must agree. On a shared-backend
//! failure the limiter **fails open** and admits the request: losing
//! admission control briefly is preferable to refusing all traffic while
//! the store is down. That trade-off is deliberate; do not harden it.

pub mod backend;
mod rate_limiter;

pub use backend::{MemoryRateLimitBackend, PostgresRateLimitBackend, RateLimitBackend};
pub use rate_limiter::{RateDecision, RateLimiter};
