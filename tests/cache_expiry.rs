//! TTL cache behavior through the assembled context.

use std::time::Duration;

use draftmill_core::cache::CacheNamespace;
use draftmill_core::config::CoreConfig;
use draftmill_core::context::CoreContext;
use serde_json::json;

#[tokio::test]
async fn hit_before_ttl_miss_after_even_without_a_sweep() {
    let core = CoreContext::new(CoreConfig::default());
    let cache = core.cache();

    cache.set("draft:42", json!("cached"), Duration::from_secs(1)).await;
    assert_eq!(cache.get("draft:42").await, Some(json!("cached")));

    // The default sweep interval is minutes away; the read alone must
    // enforce expiry.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(cache.get("draft:42").await, None);

    core.shutdown().await;
}

#[tokio::test]
async fn namespaces_isolate_artifact_classes() {
    let core = CoreContext::new(CoreConfig::default());
    let cache = core.cache();
    let identifier = "https://example.com/watch?v=42";

    cache
        .put_scoped(CacheNamespace::SourceTranscript, identifier, json!("transcript"))
        .await;

    assert_eq!(
        cache.get_scoped(CacheNamespace::SourceTranscript, identifier).await,
        Some(json!("transcript"))
    );
    assert_eq!(
        cache.get_scoped(CacheNamespace::RenderedArticle, identifier).await,
        None
    );

    core.shutdown().await;
}

#[tokio::test]
async fn delete_and_clear_behave_as_misses_afterward() {
    let core = CoreContext::new(CoreConfig::default());
    let cache = core.cache();

    cache.set("a", json!(1), Duration::from_secs(60)).await;
    cache.set("b", json!(2), Duration::from_secs(60)).await;

    cache.delete("a").await;
    assert_eq!(cache.get("a").await, None);
    assert_eq!(cache.get("b").await, Some(json!(2)));

    cache.clear_all().await;
    assert_eq!(cache.get("b").await, None);

    core.shutdown().await;
}
