//! Structured error types shared across the core components.
//!
//! Only two failure kinds cross component boundaries as errors: a shared
//! backend becoming unreachable, and an enqueue attempt against a queue
//! that has shut down. Everything else is either an ordinary absent result
//! (`Option::None`) or a decision value (`RateDecision`), and job-payload
//! failures are captured on the job record rather than propagated.

/// Failure talking to a shared backend store.
///
/// Callers never see this directly: the cache resolves it as a miss and the
/// rate limiter resolves it by admitting the request. It exists so backend
/// implementations have one honest channel for infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The shared store rejected or failed a query.
    #[error("shared store query failed: {0}")]
    Store(#[from] sqlx::Error),

    /// A stored payload could not be serialized or deserialized.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure to accept new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The queue has been shut down and rejects all new work.
    #[error("job queue is shut down and no longer accepting work")]
    QueueClosed,
}
