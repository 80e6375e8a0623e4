//! # Cache Manager
//!
//! Namespaced TTL cache for the expensive external calls the platform
//! repeats: fetched source transcripts, rendered articles, generated
//! media, and raw model replies. Never a source of truth — a miss always
//! means "recompute", so a backend failure on read is resolved as a miss
//! (fail-soft) instead of an error.
//!
//! Eviction is dual: `get()` enforces expiry lazily on every read, and a
//! periodic sweep bounds memory for the in-process backend. The sweep is
//! a safety net, never the only eviction path — a miss is correct even
//! before the first sweep runs.

pub mod backend;
mod manager;

pub use backend::{CacheBackend, MemoryCacheBackend, PostgresCacheBackend};
pub use manager::{CacheManager, CacheNamespace};
