//! Sliding-window admission semantics as the transport layer sees them.

use std::time::Duration;

use draftmill_core::config::CoreConfig;
use draftmill_core::context::CoreContext;

#[tokio::test]
async fn three_allowed_then_denied_without_consuming_a_slot() {
    let core = CoreContext::new(CoreConfig::default());
    let limiter = core.rate_limiter();
    let window = Duration::from_secs(60);

    for expected in 1..=3u32 {
        let decision = limiter.check("user-1", "generate", 3, window).await;
        assert!(decision.allowed);
        assert_eq!(decision.current_count, expected);
        assert_eq!(decision.retry_after_secs, 0);
    }

    let denied = limiter.check("user-1", "generate", 3, window).await;
    assert!(!denied.allowed);
    assert_eq!(denied.current_count, 3, "a denial never increments the count");
    assert!(denied.retry_after_secs > 0);
    assert!(denied.retry_after_secs <= 60);

    core.shutdown().await;
}

#[tokio::test]
async fn window_elapse_readmits_with_a_fresh_count() {
    let core = CoreContext::new(CoreConfig::default());
    let limiter = core.rate_limiter();
    let window = Duration::from_millis(200);

    for _ in 0..3 {
        assert!(limiter.check("user-1", "generate", 3, window).await.allowed);
    }
    assert!(!limiter.check("user-1", "generate", 3, window).await.allowed);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let fresh = limiter.check("user-1", "generate", 3, window).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.current_count, 1);

    core.shutdown().await;
}

#[tokio::test]
async fn usage_reads_and_subject_resets() {
    let core = CoreContext::new(CoreConfig::default());
    let limiter = core.rate_limiter();
    let window = Duration::from_secs(60);

    limiter.check("user-1", "generate", 10, window).await;
    limiter.check("user-1", "generate", 10, window).await;
    limiter.check("user-1", "export", 10, window).await;

    assert_eq!(limiter.usage("user-1", "generate", window).await, 2);
    assert_eq!(limiter.usage("user-1", "export", window).await, 1);
    assert_eq!(limiter.usage("user-2", "generate", window).await, 0);

    limiter.reset("user-1").await;
    assert_eq!(limiter.usage("user-1", "generate", window).await, 0);
    assert_eq!(limiter.usage("user-1", "export", window).await, 0);

    core.shutdown().await;
}
