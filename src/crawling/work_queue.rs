//! # Bounded Work Queue
//!
//! Runs asynchronous jobs with a hard ceiling on how many are in flight.
//!
//! - `enqueue` appends a job and immediately starts as many pending jobs as
//!   the ceiling allows
//! - every settled job (success, error or panic) frees its slot, records a
//!   [`JobOutcome`] and starts the next pending jobs
//! - [`WorkQueue::finished`] resolves on the zero crossing of
//!   `pending + running`; enqueueing flips the signal back to busy under the
//!   same lock that changes the counts, so a job added by a running job keeps
//!   `finished` pending
//!
//! Bookkeeping lives behind one `std::sync::Mutex` that is never held across
//! an await point or while spawning.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Position of a job in enqueue order, starting at 0.
pub type JobId = u64;

type TaskFn<A, R> = dyn Fn(A) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync;

/// Why a job produced no value.
#[derive(Error, Debug)]
pub enum JobFailure {
    #[error("job {job_id} failed: {error:#}")]
    Failed { job_id: JobId, error: anyhow::Error },

    #[error("job {job_id} panicked: {message}")]
    Panicked { job_id: JobId, message: String },
}

impl JobFailure {
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Failed { job_id, .. } | Self::Panicked { job_id, .. } => *job_id,
        }
    }
}

/// Settled job, recorded in completion order.
#[derive(Debug)]
pub struct JobOutcome<R> {
    pub job_id: JobId,
    pub result: Result<R, JobFailure>,
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub peak_running: usize,
}

/// Drained outcomes, split by result.
#[derive(Debug)]
pub struct QueueReport<R> {
    /// Successful values in completion order
    pub results: Vec<R>,
    pub failures: Vec<JobFailure>,
}

impl<R> Default for QueueReport<R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
        }
    }
}

struct QueueState<A, R> {
    pending: VecDeque<(JobId, A)>,
    running: HashSet<JobId>,
    outcomes: Vec<JobOutcome<R>>,
    next_id: JobId,
    completed: usize,
    failed: usize,
    peak_running: usize,
}

struct Shared<A, R> {
    name: String,
    concurrency: usize,
    task: Box<TaskFn<A, R>>,
    state: Mutex<QueueState<A, R>>,
    /// `true` while `pending + running == 0`
    idle: watch::Sender<bool>,
}

/// Cloneable handle to a bounded queue.
///
/// Enqueueing spawns onto the current tokio runtime and must happen inside one.
pub struct WorkQueue<A, R> {
    shared: Arc<Shared<A, R>>,
}

impl<A, R> Clone for WorkQueue<A, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, R> WorkQueue<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Create a queue running `task` for every job, at most `concurrency` at once.
    ///
    /// A concurrency of 0 is clamped to 1.
    pub fn new<F, Fut>(name: impl Into<String>, concurrency: usize, task: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let name = name.into();
        let concurrency = if concurrency == 0 {
            warn!("Queue '{}' configured with concurrency 0; using 1", name);
            1
        } else {
            concurrency
        };
        let (idle, _) = watch::channel(true);

        Self {
            shared: Arc::new(Shared {
                name,
                concurrency,
                task: Box::new(move |args| task(args).boxed()),
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: HashSet::new(),
                    outcomes: Vec::new(),
                    next_id: 0,
                    completed: 0,
                    failed: 0,
                    peak_running: 0,
                }),
                idle,
            }),
        }
    }

    /// Append a job and start work if a slot is free.
    pub fn enqueue(&self, args: A) -> JobId {
        let mut state = self.lock();
        let job_id = state.next_id;
        state.next_id += 1;
        state.pending.push_back((job_id, args));
        self.shared.idle.send_replace(false);

        let ready = self.take_ready(&mut state);
        drop(state);

        self.start(ready);
        job_id
    }

    /// Resolves once no job is pending or running.
    ///
    /// Resolves immediately on a queue that is already quiescent.
    pub async fn finished(&self) {
        let mut idle = self.shared.idle.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = idle.wait_for(|idle| *idle).await;
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            queued: state.pending.len(),
            running: state.running.len(),
            completed: state.completed,
            failed: state.failed,
            peak_running: state.peak_running,
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self.shared.idle.borrow()
    }

    /// Drain every outcome recorded so far, in completion order.
    pub fn take_outcomes(&self) -> Vec<JobOutcome<R>> {
        std::mem::take(&mut self.lock().outcomes)
    }

    /// Drain outcomes, separating values from failures.
    pub fn take_report(&self) -> QueueReport<R> {
        let mut report = QueueReport::default();
        for outcome in self.take_outcomes() {
            match outcome.result {
                Ok(value) => report.results.push(value),
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<A, R>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop pending jobs into the running set while below the ceiling.
    fn take_ready(&self, state: &mut QueueState<A, R>) -> Vec<(JobId, A)> {
        let mut ready = Vec::new();
        while state.running.len() < self.shared.concurrency {
            let Some((job_id, args)) = state.pending.pop_front() else {
                break;
            };
            state.running.insert(job_id);
            ready.push((job_id, args));
        }
        state.peak_running = state.peak_running.max(state.running.len());
        ready
    }

    fn start(&self, ready: Vec<(JobId, A)>) {
        for (job_id, args) in ready {
            debug!("▶️ [{}] starting job {}", self.shared.name, job_id);
            let queue = self.clone();
            tokio::spawn(async move {
                let run = AssertUnwindSafe(async { (queue.shared.task)(args).await })
                    .catch_unwind()
                    .await;
                queue.settle(job_id, run);
            });
        }
    }

    fn settle(&self, job_id: JobId, run: Result<anyhow::Result<R>, Box<dyn Any + Send>>) {
        let result = match run {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(JobFailure::Failed { job_id, error }),
            Err(payload) => Err(JobFailure::Panicked {
                job_id,
                message: panic_message(payload.as_ref()),
            }),
        };

        let mut state = self.lock();
        state.running.remove(&job_id);
        match &result {
            Ok(_) => state.completed += 1,
            Err(failure) => {
                state.failed += 1;
                warn!("❌ [{}] {}", self.shared.name, failure);
            }
        }
        state.outcomes.push(JobOutcome { job_id, result });

        let ready = self.take_ready(&mut state);
        if state.pending.is_empty() && state.running.is_empty() {
            debug!("✅ [{}] queue drained", self.shared.name);
            self.shared.idle.send_replace(true);
        }
        drop(state);

        self.start(ready);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
