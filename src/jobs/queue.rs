use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::JobQueueConfig;
use crate::error::EnqueueError;
use crate::jobs::{JobSnapshot, JobState, QueueStats};
use crate::progress::ProgressTracker;

/// What a unit of work produces: an opaque JSON payload on success, an
/// opaque error otherwise. The error's display chain becomes the job's
/// recorded `error` string.
pub type WorkResult = anyhow::Result<Value>;

type WorkFuture = BoxFuture<'static, WorkResult>;
type WorkFn = Box<dyn FnOnce(WorkContext) -> WorkFuture + Send + Sync + 'static>;
type CompletionCallback = Box<dyn FnOnce(&Value) + Send + Sync + 'static>;

/// Everything needed to enqueue one unit of work.
pub struct JobRequest {
    job_type: String,
    priority: i32,
    args: Value,
    work: WorkFn,
    callback: Option<CompletionCallback>,
}

impl JobRequest {
    /// A request running `work` under the given job type tag.
    pub fn new<F, Fut>(job_type: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(WorkContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        Self {
            job_type: job_type.into(),
            priority: 0,
            args: Value::Null,
            work: Box::new(move |ctx| work(ctx).boxed()),
            callback: None,
        }
    }

    /// Arguments handed to the work function through its [`WorkContext`].
    pub fn args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// Recorded on the job for observability. Scheduling stays FIFO.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Callback invoked with the result after a successful run. Its
    /// failures are logged and never touch the job's status.
    pub fn on_complete<C>(mut self, callback: C) -> Self
    where
        C: FnOnce(&Value) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

/// Handle given to a running work function: its arguments plus a way to
/// report progress while it runs.
pub struct WorkContext {
    job_id: Uuid,
    args: Value,
    core: Arc<QueueCore>,
}

impl WorkContext {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Update the job's own progress percentage (clamped to 0–100).
    pub async fn report_progress(&self, percent: u8) {
        self.core.set_progress(&self.job_id, percent).await;
    }

    /// Update the job's progress and publish a named stage to the
    /// attached progress tracker for polling consumers.
    pub async fn report_stage(&self, stage: &str, percent: u8, message: &str) {
        self.core.set_progress(&self.job_id, percent).await;
        if let Some(tracker) = &self.core.progress {
            tracker.update(self.job_id, stage, percent, message);
        }
    }
}

/// Full job record. Private to the queue: mutated only under the table
/// lock, by the claiming worker or by `cancel()`.
struct Job {
    job_type: String,
    priority: i32,
    status: JobState,
    progress: u8,
    created_at: chrono::DateTime<Utc>,
    started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
    result: Option<Value>,
    error: Option<String>,
    worker_id: Option<usize>,
    args: Value,
    work: Option<WorkFn>,
    callback: Option<CompletionCallback>,
}

impl Job {
    fn snapshot(&self, id: Uuid) -> JobSnapshot {
        JobSnapshot {
            id,
            job_type: self.job_type.clone(),
            priority: self.priority,
            status: self.status,
            progress: self.progress,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result: self.result.clone(),
            error: self.error.clone(),
            worker_id: self.worker_id,
        }
    }
}

enum QueueToken {
    Run(Uuid),
    Shutdown,
}

struct QueueCore {
    config: JobQueueConfig,
    jobs: RwLock<HashMap<Uuid, Job>>,
    tx: mpsc::UnboundedSender<QueueToken>,
    /// Workers take turns holding this to receive; at-most-once delivery
    /// comes from the channel itself.
    rx: AsyncMutex<mpsc::UnboundedReceiver<QueueToken>>,
    /// Run tokens currently in the channel.
    depth: AtomicUsize,
    accepting: AtomicBool,
    progress: Option<Arc<ProgressTracker>>,
}

impl QueueCore {
    async fn set_progress(&self, job_id: &Uuid, percent: u8) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            job.progress = percent.min(100);
        }
    }
}

/// Fixed pool of worker loops over a shared FIFO channel of job ids.
pub struct JobQueue {
    core: Arc<QueueCore>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Start the queue and its worker loops. Must run inside a tokio
    /// runtime. `workers == 0` is legal: jobs accumulate as pending.
    pub fn start(config: JobQueueConfig, progress: Option<Arc<ProgressTracker>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker_count = config.workers;
        let core = Arc::new(QueueCore {
            config,
            jobs: RwLock::new(HashMap::new()),
            tx,
            rx: AsyncMutex::new(rx),
            depth: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            progress,
        });

        let handles = (0..worker_count)
            .map(|worker_id| {
                let core = Arc::clone(&core);
                tokio::spawn(worker_loop(core, worker_id))
            })
            .collect();

        info!(workers = worker_count, "job queue started");
        Self {
            core,
            workers: parking_lot::Mutex::new(handles),
        }
    }

    /// Record a job and push its id for delivery. Never blocks beyond the
    /// map insert; the returned id is immediately queryable as pending.
    pub async fn enqueue(&self, request: JobRequest) -> Result<Uuid, EnqueueError> {
        if !self.core.accepting.load(Ordering::Acquire) {
            return Err(EnqueueError::QueueClosed);
        }

        let job_id = Uuid::new_v4();
        let job = Job {
            job_type: request.job_type.clone(),
            priority: request.priority,
            status: JobState::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            worker_id: None,
            args: request.args,
            work: Some(request.work),
            callback: request.callback,
        };

        self.core.jobs.write().await.insert(job_id, job);
        self.core.depth.fetch_add(1, Ordering::AcqRel);

        if self.core.tx.send(QueueToken::Run(job_id)).is_err() {
            // Shutdown raced us and the receiver is gone; withdraw the record.
            self.core.depth.fetch_sub(1, Ordering::AcqRel);
            self.core.jobs.write().await.remove(&job_id);
            return Err(EnqueueError::QueueClosed);
        }

        if let Some(tracker) = &self.core.progress {
            tracker.update(job_id, "queued", 0, "");
        }
        debug!(job_id = %job_id, job_type = %request.job_type, "job enqueued");
        Ok(job_id)
    }

    /// Point-in-time view of a job, or `None` for an unknown id.
    pub async fn get_status(&self, job_id: &Uuid) -> Option<JobSnapshot> {
        let jobs = self.core.jobs.read().await;
        jobs.get(job_id).map(|job| job.snapshot(*job_id))
    }

    /// Cancel a job that no worker has claimed yet. Returns `false` for
    /// unknown ids and for jobs already claimed or finished — running
    /// work cannot be interrupted.
    pub async fn cancel(&self, job_id: &Uuid) -> bool {
        let mut jobs = self.core.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) if job.status == JobState::Pending => {
                job.status = JobState::Cancelled;
                job.completed_at = Some(Utc::now());
                job.work = None;
                job.callback = None;
                info!(job_id = %job_id, "job cancelled before execution");
                true
            }
            _ => false,
        }
    }

    /// Set a job's progress percentage (clamped to 0–100).
    pub async fn update_progress(&self, job_id: &Uuid, percent: u8) {
        self.core.set_progress(job_id, percent).await;
    }

    /// Aggregate counters. At any quiescent point the five state counts
    /// sum to `total_jobs`.
    pub async fn stats(&self) -> QueueStats {
        let jobs = self.core.jobs.read().await;
        let mut stats = QueueStats {
            total_jobs: jobs.len(),
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            queue_size: self.core.depth.load(Ordering::Acquire),
            worker_count: self.core.config.workers,
        };
        for job in jobs.values() {
            match job.status {
                JobState::Pending => stats.pending += 1,
                JobState::Processing => stats.processing += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Remove terminal jobs whose completion is older than `max_age`.
    /// Returns how many were dropped. Run periodically: the table grows
    /// without bound otherwise.
    pub async fn cleanup_old_jobs(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut jobs = self.core.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal()
                && job.completed_at.map(|done| done < cutoff).unwrap_or(false))
        });
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "cleaned up old jobs");
        }
        removed
    }

    /// Remove terminal jobs older than the configured retention.
    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_old_jobs(self.core.config.retention).await
    }

    /// Stop intake, poison each worker, and wait up to the configured
    /// grace period for them to exit. Drains what is already queued but
    /// guarantees nothing: workers stuck in long work are left behind.
    pub async fn shutdown(&self) {
        info!("job queue shutting down");
        self.core.accepting.store(false, Ordering::Release);

        // One poison token per worker, behind whatever is already queued.
        for _ in 0..self.core.config.workers {
            let _ = self.core.tx.send(QueueToken::Shutdown);
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }
        match timeout(self.core.config.shutdown_grace, join_all(handles)).await {
            Ok(_) => info!("all workers exited"),
            Err(_) => warn!("shutdown grace elapsed with workers still running"),
        }
    }
}

async fn worker_loop(core: Arc<QueueCore>, worker_id: usize) {
    debug!(worker_id, "worker started");
    loop {
        // The poll timeout bounds how long a worker sits in recv() so a
        // shutdown sent while the channel is quiet is still observed.
        let token = {
            let mut rx = core.rx.lock().await;
            match timeout(core.config.poll_interval, rx.recv()).await {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(_) => continue,
            }
        };
        match token {
            QueueToken::Shutdown => break,
            QueueToken::Run(job_id) => {
                core.depth.fetch_sub(1, Ordering::AcqRel);
                run_job(&core, job_id, worker_id).await;
            }
        }
    }
    debug!(worker_id, "worker exited");
}

async fn run_job(core: &Arc<QueueCore>, job_id: Uuid, worker_id: usize) {
    // Claim under the table lock: pending → processing, take the work
    // function out of the record.
    let claimed = {
        let mut jobs = core.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobState::Pending => {
                job.status = JobState::Processing;
                job.started_at = Some(Utc::now());
                job.worker_id = Some(worker_id);
                job.work
                    .take()
                    .map(|work| (work, job.args.clone(), job.job_type.clone()))
            }
            Some(job) => {
                debug!(job_id = %job_id, status = %job.status, "skipping job no longer pending");
                None
            }
            None => {
                debug!(job_id = %job_id, "skipping job removed while queued");
                None
            }
        }
    };
    let Some((work, args, job_type)) = claimed else {
        return;
    };

    if let Some(tracker) = &core.progress {
        tracker.update(job_id, "processing", 0, "");
    }
    info!(job_id = %job_id, job_type = %job_type, worker_id, "job started");
    let started = Instant::now();

    // Execute outside the table lock — holding it here would serialize
    // every unrelated job behind this one.
    let ctx = WorkContext {
        job_id,
        args,
        core: Arc::clone(core),
    };
    let outcome = AssertUnwindSafe(work(ctx)).catch_unwind().await;

    let terminal = {
        let mut jobs = core.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            // Cleaned up mid-flight; the result has nowhere to go.
            warn!(job_id = %job_id, "job record removed during execution");
            return;
        };
        job.completed_at = Some(Utc::now());
        match outcome {
            Ok(Ok(value)) => {
                job.status = JobState::Completed;
                job.progress = 100;
                job.result = Some(value.clone());
                info!(
                    job_id = %job_id,
                    job_type = %job_type,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                (JobState::Completed, None, job.callback.take().map(|cb| (cb, value)))
            }
            Ok(Err(work_error)) => {
                let message = format!("{work_error:#}");
                warn!(job_id = %job_id, job_type = %job_type, error = %message, "job failed");
                job.status = JobState::Failed;
                job.error = Some(message.clone());
                job.callback = None;
                (JobState::Failed, Some(message), None)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(job_id = %job_id, job_type = %job_type, error = %message, "job panicked");
                job.status = JobState::Failed;
                job.error = Some(message.clone());
                job.callback = None;
                (JobState::Failed, Some(message), None)
            }
        }
    };

    let (state, error_message, callback) = terminal;
    if let Some(tracker) = &core.progress {
        match state {
            JobState::Completed => tracker.update(job_id, "completed", 100, ""),
            _ => tracker.update(job_id, "failed", 0, error_message.as_deref().unwrap_or("")),
        }
    }

    // Callback runs after the terminal state is visible, outside every
    // lock. Its panics are logged and go no further.
    if let Some((callback, value)) = callback {
        let result = std::panic::catch_unwind(AssertUnwindSafe(move || callback(&value)));
        if let Err(panic) = result {
            warn!(
                job_id = %job_id,
                error = %panic_message(panic.as_ref()),
                "completion callback panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("job panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("job panicked: {message}")
    } else {
        "job panicked".to_owned()
    }
}
