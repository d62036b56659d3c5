// SPDX-License-Identifier: MIT

//! In-process job queue with retry, timeout, and typed-failure support.
//!
//! A single worker task consumes jobs one at a time, which bounds concurrent
//! load on upstream provider APIs and means at most one job's side effects
//! are ever in flight. The processor is injected at construction; there is
//! no global queue instance.
//!
//! State lives only in memory: a process restart drops all queued and
//! in-flight work. Delivery is at-most-once with no replay - an accepted
//! constraint, not an accident.
//!
//! Failure handling distinguishes retryable failures (network blips,
//! provider 5xx) from permanent ones (bad credentials): permanent failures
//! go terminally `failed` on the first attempt instead of burning retries.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A job processing failure.
#[derive(Debug, Clone)]
pub struct JobError {
    pub message: String,
    /// Whether another attempt could plausibly succeed
    pub retryable: bool,
}

impl JobError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A queued unit of work. The id is caller-supplied, so re-enqueueing the
/// same id overwrites the previous entry (natural deduplication).
#[derive(Debug, Clone, Serialize)]
pub struct Job<T> {
    pub id: String,
    pub payload: T,
    pub status: JobStatus,
    /// Dispatch count; incremented once per attempt
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Earliest instant the next attempt may run (retry backoff)
    #[serde(skip)]
    not_before: Option<Instant>,
    /// When a completed job is evicted from the map
    #[serde(skip)]
    evict_at: Option<Instant>,
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub processing_timeout: Duration,
    /// How long completed jobs stay queryable before eviction
    pub completed_ttl: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
            processing_timeout: Duration::from_secs(120),
            completed_ttl: Duration::from_secs(60),
        }
    }
}

type Processor<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// Single-consumer retrying job queue.
pub struct JobQueue<T> {
    inner: Arc<QueueInner<T>>,
    worker: JoinHandle<()>,
}

struct QueueInner<T> {
    jobs: Mutex<HashMap<String, Job<T>>>,
    notify: Notify,
    options: QueueOptions,
    processor: Processor<T>,
}

impl<T: Clone + Send + Sync + 'static> JobQueue<T> {
    /// Create a queue and start its worker task. Must be called from within
    /// a tokio runtime.
    pub fn new(
        options: QueueOptions,
        processor: impl Fn(T) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync + 'static,
    ) -> Self {
        let inner = Arc::new(QueueInner {
            jobs: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            options,
            processor: Arc::new(processor),
        });

        let worker = tokio::spawn(worker_loop(Arc::clone(&inner)));

        Self { inner, worker }
    }

    /// Enqueue a job. A duplicate id overwrites the prior entry.
    pub fn add(&self, id: impl Into<String>, payload: T) {
        let id = id.into();
        let job = Job {
            id: id.clone(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: self.inner.options.max_attempts,
            created_at: Utc::now(),
            processed_at: None,
            last_error: None,
            not_before: None,
            evict_at: None,
        };

        self.inner.jobs.lock().expect("queue lock").insert(id, job);
        self.inner.notify.notify_one();
    }

    /// Look up a job by id (including terminal ones until eviction).
    pub fn get_job(&self, id: &str) -> Option<Job<T>> {
        self.inner.jobs.lock().expect("queue lock").get(id).cloned()
    }

    /// Current queue statistics.
    pub fn stats(&self) -> QueueStats {
        let jobs = self.inner.jobs.lock().expect("queue lock");
        let mut stats = QueueStats {
            total: jobs.len(),
            ..QueueStats::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

impl<T> Drop for JobQueue<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// What the worker should do next.
enum Step<T> {
    /// Dispatch this job (already marked processing)
    Run { id: String, payload: T },
    /// Nothing eligible yet; wake at this instant or on enqueue
    Sleep(Instant),
    /// Queue empty of actionable work; wait for an enqueue
    Idle,
}

async fn worker_loop<T: Clone + Send + Sync + 'static>(inner: Arc<QueueInner<T>>) {
    loop {
        match next_step(&inner) {
            Step::Run { id, payload } => {
                let attempt = tokio::time::timeout(
                    inner.options.processing_timeout,
                    (inner.processor)(payload),
                )
                .await;

                // A timeout takes the same failure path as a processor error
                let outcome = match attempt {
                    Ok(result) => result,
                    Err(_) => Err(JobError::transient("Job timeout")),
                };

                settle(&inner, &id, outcome);
            }
            Step::Sleep(deadline) => {
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            Step::Idle => inner.notify.notified().await,
        }
    }
}

/// Evict expired completed jobs, then pick the oldest dispatchable pending
/// job, or compute how long to wait.
fn next_step<T: Clone>(inner: &QueueInner<T>) -> Step<T> {
    let now = Instant::now();
    let mut jobs = inner.jobs.lock().expect("queue lock");

    jobs.retain(|_, job| job.evict_at.map_or(true, |at| at > now));

    let candidate = jobs
        .values()
        .filter(|job| {
            job.status == JobStatus::Pending && job.not_before.map_or(true, |at| at <= now)
        })
        .min_by_key(|job| job.created_at)
        .map(|job| job.id.clone());

    if let Some(id) = candidate {
        let job = jobs.get_mut(&id).expect("candidate exists");
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.not_before = None;
        return Step::Run {
            id,
            payload: job.payload.clone(),
        };
    }

    let wake = jobs
        .values()
        .filter_map(|job| match job.status {
            JobStatus::Pending => job.not_before,
            JobStatus::Completed => job.evict_at,
            _ => None,
        })
        .min();

    match wake {
        Some(deadline) => Step::Sleep(deadline),
        None => Step::Idle,
    }
}

/// Apply an attempt's outcome. If the entry was overwritten by a fresh
/// `add` while the attempt ran, the result is discarded and the new entry
/// runs on its own.
fn settle<T>(inner: &QueueInner<T>, id: &str, outcome: Result<(), JobError>) {
    let now = Instant::now();
    let mut jobs = inner.jobs.lock().expect("queue lock");

    let Some(job) = jobs.get_mut(id) else {
        return;
    };
    if job.status != JobStatus::Processing {
        return;
    }

    match outcome {
        Ok(()) => {
            job.status = JobStatus::Completed;
            job.processed_at = Some(Utc::now());
            job.evict_at = Some(now + inner.options.completed_ttl);
            tracing::debug!(job_id = %job.id, attempts = job.attempts, "Job completed");
        }
        Err(err) => {
            job.last_error = Some(err.message.clone());

            if err.retryable && job.attempts < job.max_attempts {
                job.status = JobStatus::Pending;
                job.not_before = Some(now + inner.options.retry_delay);
                tracing::warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    error = %err.message,
                    "Job failed, scheduling retry"
                );
            } else {
                job.status = JobStatus::Failed;
                job.processed_at = Some(Utc::now());
                tracing::error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    retryable = err.retryable,
                    error = %err.message,
                    "Job failed terminally"
                );
            }
        }
    }
}
