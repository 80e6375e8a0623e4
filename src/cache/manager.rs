use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::cache::CacheBackend;
use crate::constants::{self, cache_ttl};

/// Artifact classes with distinct key prefixes and default TTLs.
///
/// Scoped keys hash the caller's identifier under a fixed uuid-v5
/// namespace, so a transcript and a rendered article derived from the
/// same identifier can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// Raw source material fetched from elsewhere; immutable per id.
    SourceTranscript,
    /// Fully rendered article payloads.
    RenderedArticle,
    /// Generated media, keyed by prompt digest.
    GeneratedImage,
    /// Raw model replies, keyed by prompt digest.
    ModelReply,
}

impl CacheNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::SourceTranscript => "source_transcript",
            Self::RenderedArticle => "rendered_article",
            Self::GeneratedImage => "generated_image",
            Self::ModelReply => "model_reply",
        }
    }

    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::SourceTranscript => cache_ttl::SOURCE_TRANSCRIPT,
            Self::RenderedArticle => cache_ttl::RENDERED_ARTICLE,
            Self::GeneratedImage => cache_ttl::GENERATED_IMAGE,
            Self::ModelReply => cache_ttl::MODEL_REPLY,
        }
    }

    fn key_for(&self, identifier: &str) -> String {
        let digest = Uuid::new_v5(&constants::CACHE_KEY_NAMESPACE, identifier.as_bytes());
        format!("{}:{digest}", self.prefix())
    }
}

/// TTL cache over a pluggable backend.
///
/// Read failures resolve as misses and write failures are logged and
/// dropped: every caller must already know how to recompute on a miss,
/// so a flaky backend degrades throughput, never correctness.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
            sweeper: None,
        }
    }

    /// Attach the sweep task handle so it is stopped when the manager is
    /// dropped.
    pub fn with_sweeper(mut self, sweeper: JoinHandle<()>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Raw lookup. A backend failure is a logged miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, key, "cache backend unavailable, treating as miss");
                None
            }
        }
    }

    /// Raw write with an explicit TTL. Backend failures are logged and
    /// swallowed.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        if let Err(error) = self.backend.set(key, &value, ttl).await {
            warn!(%error, key, "cache backend unavailable, dropping write");
        }
    }

    /// Raw write with the manager's default TTL.
    pub async fn set_default(&self, key: &str, value: Value) {
        self.set(key, value, self.default_ttl).await;
    }

    pub async fn delete(&self, key: &str) {
        if let Err(error) = self.backend.delete(key).await {
            warn!(%error, key, "cache backend unavailable, delete dropped");
        }
    }

    pub async fn clear_all(&self) {
        if let Err(error) = self.backend.clear().await {
            warn!(%error, "cache backend unavailable, clear dropped");
        }
    }

    /// Namespaced lookup.
    pub async fn get_scoped(&self, namespace: CacheNamespace, identifier: &str) -> Option<Value> {
        self.get(&namespace.key_for(identifier)).await
    }

    /// Namespaced write with the namespace's default TTL.
    pub async fn put_scoped(&self, namespace: CacheNamespace, identifier: &str, value: Value) {
        self.set(&namespace.key_for(identifier), value, namespace.default_ttl())
            .await;
    }

    /// Namespaced write with an explicit TTL.
    pub async fn put_scoped_with_ttl(
        &self,
        namespace: CacheNamespace,
        identifier: &str,
        value: Value,
        ttl: Duration,
    ) {
        self.set(&namespace.key_for(identifier), value, ttl).await;
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::error::BackendError;
    use async_trait::async_trait;
    use serde_json::json;

    fn memory_manager() -> CacheManager {
        CacheManager::new(
            Arc::new(MemoryCacheBackend::new()),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn scoped_namespaces_cannot_collide() {
        let cache = memory_manager();
        let id = "https://example.com/video/42";

        cache
            .put_scoped(CacheNamespace::SourceTranscript, id, json!("transcript"))
            .await;
        cache
            .put_scoped(CacheNamespace::RenderedArticle, id, json!("article"))
            .await;

        assert_eq!(
            cache.get_scoped(CacheNamespace::SourceTranscript, id).await,
            Some(json!("transcript"))
        );
        assert_eq!(
            cache.get_scoped(CacheNamespace::RenderedArticle, id).await,
            Some(json!("article"))
        );
        assert!(cache.get_scoped(CacheNamespace::ModelReply, id).await.is_none());
    }

    #[tokio::test]
    async fn scoped_keys_are_stable() {
        // Same namespace + identifier must address the same entry across
        // manager instances (keys survive process restarts).
        let a = CacheNamespace::ModelReply.key_for("prompt-digest-1");
        let b = CacheNamespace::ModelReply.key_for("prompt-digest-1");
        assert_eq!(a, b);
        assert!(a.starts_with("model_reply:"));
    }

    #[tokio::test]
    async fn expired_scoped_entry_misses() {
        let cache = memory_manager();
        cache
            .put_scoped_with_ttl(
                CacheNamespace::ModelReply,
                "prompt",
                json!("reply"),
                Duration::from_millis(30),
            )
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get_scoped(CacheNamespace::ModelReply, "prompt").await.is_none());
    }

    /// Backend that fails every call, standing in for an unreachable store.
    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<Value>, BackendError> {
            Err(BackendError::Store(sqlx::Error::PoolClosed))
        }
        async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<(), BackendError> {
            Err(BackendError::Store(sqlx::Error::PoolClosed))
        }
        async fn delete(&self, _key: &str) -> Result<(), BackendError> {
            Err(BackendError::Store(sqlx::Error::PoolClosed))
        }
        async fn clear(&self) -> Result<(), BackendError> {
            Err(BackendError::Store(sqlx::Error::PoolClosed))
        }
        async fn purge_expired(&self) -> Result<u64, BackendError> {
            Err(BackendError::Store(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_miss_not_an_error() {
        let cache = CacheManager::new(Arc::new(DownBackend), Duration::from_secs(3600));

        assert!(cache.get("k").await.is_none());
        // Writes and deletes must not panic or propagate.
        cache.set("k", json!(1), Duration::from_secs(1)).await;
        cache.delete("k").await;
        cache.clear_all().await;
    }
}
