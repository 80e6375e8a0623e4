//! # Job Queue
//!
//! Fixed worker pool running long units of work off the request path.
//! `enqueue()` records the job and pushes its id onto a shared channel
//! without blocking; worker loops claim ids one at a time, execute the
//! work outside the job-table lock, and write the terminal state back.
//! Callers poll [`JobQueue::get_status`] — enqueueing returning never
//! means execution has started.
//!
//! Failure isolation is the point: a work function that errors or panics
//! marks its own job failed and nothing else. The worker loop survives
//! every job failure, and a completion callback that misbehaves can only
//! get itself logged.

mod queue;
mod types;

pub use queue::{JobQueue, JobRequest, WorkContext, WorkResult};
pub use types::{JobSnapshot, JobState, QueueStats};
