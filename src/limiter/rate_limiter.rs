use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::limiter::RateLimitBackend;

/// Outcome of an admission check.
///
/// Denial is a decision, not an error: the transport layer maps it to a
/// "too many requests" response carrying `retry_after_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Whole seconds until a retry could succeed; zero when admitted.
    pub retry_after_secs: u64,
    /// Requests counted in the trailing window, including this one when
    /// admitted.
    pub current_count: u32,
}

impl RateDecision {
    /// Decision used when the backend is unreachable: admit, report
    /// nothing counted.
    pub(crate) fn fail_open() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
            current_count: 0,
        }
    }
}

/// Sliding-window admission control over a pluggable window store.
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { backend }
    }

    fn window_key(subject: &str, action: &str) -> String {
        format!("{subject}:{action}")
    }

    /// Decide whether `subject` may perform `action` under a limit of
    /// `max_requests` per trailing `window`.
    ///
    /// A backend failure admits the request (fail-open): brief loss of
    /// admission control beats refusing all traffic while the shared
    /// store is down.
    pub async fn check(
        &self,
        subject: &str,
        action: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateDecision {
        let key = Self::window_key(subject, action);
        match self.backend.check(&key, max_requests, window).await {
            Ok(decision) => {
                if !decision.allowed {
                    debug!(
                        subject,
                        action,
                        current_count = decision.current_count,
                        retry_after_secs = decision.retry_after_secs,
                        "rate limit exceeded"
                    );
                }
                decision
            }
            Err(error) => {
                warn!(%error, subject, action, "rate limit backend unavailable, admitting request");
                RateDecision::fail_open()
            }
        }
    }

    /// Requests currently counted for (subject, action) without consuming
    /// a slot. Reports zero when the backend is unreachable.
    pub async fn usage(&self, subject: &str, action: &str, window: Duration) -> u32 {
        let key = Self::window_key(subject, action);
        match self.backend.usage(&key, window).await {
            Ok(count) => count,
            Err(error) => {
                warn!(%error, subject, action, "rate limit backend unavailable for usage read");
                0
            }
        }
    }

    /// Forget every window for `subject`, across all actions.
    pub async fn reset(&self, subject: &str) {
        let prefix = format!("{subject}:");
        if let Err(error) = self.backend.reset_prefix(&prefix).await {
            warn!(%error, subject, "rate limit backend unavailable for reset");
        }
    }
}
