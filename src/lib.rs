#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Draftmill Core
//!
//! Background execution and resource coordination for the Draftmill
//! content platform. The web layer turns URLs and topics into formatted
//! articles; this crate is the part underneath with real concurrency
//! invariants — the worker pool that runs those long generation jobs off
//! the request path, the admission control in front of them, the cache
//! that keeps expensive external calls from repeating, and the progress
//! side channel the polling endpoints read.
//!
//! ## Architecture
//!
//! - [`jobs`] — fixed worker pool over a FIFO channel of job ids, with
//!   per-job lifecycle tracking, pre-claim cancellation, and failure
//!   isolation at the worker boundary.
//! - [`limiter`] — sliding-window admission control keyed by
//!   (subject, action); fails open when its shared store is down.
//! - [`cache`] — namespaced TTL cache over pluggable backends; treats
//!   backend failures as misses.
//! - [`progress`] — last-write-wins progress snapshots for polling,
//!   decoupled from the job table's lock.
//! - [`context`] — the dependency-injection container tying the four
//!   together, built once per process (or per test).
//!
//! Backends for the limiter and cache come in two flavors chosen at
//! construction: in-process maps for a single instance, or shared
//! Postgres tables when several instances must agree.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use draftmill_core::config::CoreConfig;
//! use draftmill_core::context::CoreContext;
//! use draftmill_core::jobs::JobRequest;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let core = CoreContext::new(CoreConfig::default());
//!
//! let job_id = core
//!     .job_queue()
//!     .enqueue(
//!         JobRequest::new("generate_article", |ctx| async move {
//!             ctx.report_stage("drafting", 20, "writing sections").await;
//!             Ok(json!({ "title": "..." }))
//!         })
//!         .args(json!({ "topic": "fermentation" })),
//!     )
//!     .await?;
//!
//! // Poll until terminal.
//! let snapshot = core.job_queue().get_status(&job_id).await;
//! # let _ = snapshot;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod jobs;
pub mod limiter;
pub mod logging;
pub mod progress;

pub use cache::{CacheManager, CacheNamespace};
pub use config::{BackendConfig, CoreConfig, JobQueueConfig};
pub use context::CoreContext;
pub use error::{BackendError, EnqueueError};
pub use jobs::{JobQueue, JobRequest, JobSnapshot, JobState, QueueStats, WorkContext};
pub use limiter::{RateDecision, RateLimiter};
pub use progress::{ProgressRecord, ProgressTracker};
