//! Fanning chunk work out to workers and collecting the outcomes.
//!
//! [`DispatchCoordinator`] takes a list of independent work items (frame
//! ranges, audio time ranges, whole sources), runs a closure on each using
//! the configured [`ConcurrencyPolicy`], and gathers every outcome into a
//! [`JobResult`]. A failing or panicking item is recorded as a
//! [`SiftError::ChunkFailure`] and never cancels its siblings.
//!
//! Each worker builds its own decoder or transcoder process; the closure
//! receives its item by value and nothing mutable is shared between items.
//!
//! # Example
//!
//! ```
//! use framesift::{ConcurrencyPolicy, DispatchCoordinator, JobContext};
//!
//! let context = JobContext::new("squares");
//! let mut coordinator = DispatchCoordinator::new(ConcurrencyPolicy::Threads, 4);
//! let result = coordinator.run(&context, (1..=10u64).collect(), |n| Ok(n * n))?;
//! assert_eq!(result.succeeded(), 10);
//! # Ok::<(), framesift::SiftError>(())
//! ```

use std::{
    any::Any,
    fmt::{Debug, Formatter, Result as FmtResult},
    panic::{AssertUnwindSafe, catch_unwind},
    time::{Duration, Instant},
};

use rayon::{
    ThreadPoolBuilder,
    iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator},
};

use crate::error::SiftError;

/// How work items are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// A bounded pool of OS threads sized to the worker count.
    #[default]
    Threads,
    /// Every item on the calling thread, in order.
    Inline,
}

/// Lifecycle of one coordinated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Work items are known but nothing has started.
    Planned,
    /// Items are running on workers.
    Dispatched,
    /// Every item has finished and outcomes are collected.
    Aggregated,
}

/// Identity and timing of a job, passed to the components that run it.
#[derive(Debug, Clone)]
pub struct JobContext {
    label: String,
    started: Instant,
}

impl JobContext {
    /// Start a job named `label` (usually the source's safe name).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    /// The job name.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Time since the job started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// The outcome of one work item.
#[derive(Debug)]
pub struct ChunkOutcome<T> {
    /// Zero-based position of the item in the submitted list.
    pub index: usize,
    /// What the item produced.
    pub result: Result<T, SiftError>,
}

/// Every outcome of a job, in submission order.
pub struct JobResult<T> {
    outcomes: Vec<ChunkOutcome<T>>,
    elapsed: Duration,
}

impl<T> JobResult<T> {
    /// All outcomes, ordered by item index.
    pub fn outcomes(&self) -> &[ChunkOutcome<T>] {
        &self.outcomes
    }

    /// Number of items that returned `Ok`.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.result.is_ok()).count()
    }

    /// Number of items that failed or panicked.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether every item succeeded.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// The errors, in item order.
    pub fn errors(&self) -> impl Iterator<Item = &SiftError> {
        self.outcomes.iter().filter_map(|outcome| outcome.result.as_ref().err())
    }

    /// The successful values, in item order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.outcomes.iter().filter_map(|outcome| outcome.result.as_ref().ok())
    }

    /// Consume the result and keep only the successful values.
    pub fn into_values(self) -> Vec<T> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| outcome.result.ok())
            .collect()
    }

    /// Consume the result, keeping every outcome in item order.
    pub fn into_outcomes(self) -> Vec<ChunkOutcome<T>> {
        self.outcomes
    }

    /// Wall-clock time from dispatch to aggregation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl<T> Debug for JobResult<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("JobResult")
            .field("succeeded", &self.succeeded())
            .field("failed", &self.failed())
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// A bounded set of workers executing items under one [`ConcurrencyPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    policy: ConcurrencyPolicy,
    workers: usize,
}

impl WorkerPool {
    /// A pool of at most `workers` concurrent items; zero is treated as one.
    pub fn new(policy: ConcurrencyPolicy, workers: usize) -> Self {
        Self {
            policy,
            workers: workers.max(1),
        }
    }

    /// Maximum items in flight.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// The execution policy.
    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Apply `work` to every item, returning results in item order.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::WorkerPool`] if the thread pool cannot be built.
    pub fn map<I, R, F>(&self, items: Vec<I>, work: F) -> Result<Vec<R>, SiftError>
    where
        I: Send,
        R: Send,
        F: Fn(usize, I) -> R + Send + Sync,
    {
        match self.policy {
            ConcurrencyPolicy::Inline => Ok(items
                .into_iter()
                .enumerate()
                .map(|(index, item)| work(index, item))
                .collect()),
            ConcurrencyPolicy::Threads => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(self.workers.min(items.len().max(1)))
                    .thread_name(|index| format!("framesift-worker-{index}"))
                    .build()
                    .map_err(|error| SiftError::WorkerPool(error.to_string()))?;
                Ok(pool.install(|| {
                    items
                        .into_par_iter()
                        .enumerate()
                        .map(|(index, item)| work(index, item))
                        .collect()
                }))
            }
        }
    }
}

/// Runs work items on a [`WorkerPool`] and isolates their failures.
#[derive(Debug)]
pub struct DispatchCoordinator {
    pool: WorkerPool,
    phase: JobPhase,
}

impl DispatchCoordinator {
    /// Create a coordinator running at most `workers` items at once.
    ///
    /// A worker count of zero is treated as one.
    pub fn new(policy: ConcurrencyPolicy, workers: usize) -> Self {
        Self::with_pool(WorkerPool::new(policy, workers))
    }

    /// Create a coordinator over an existing pool.
    pub fn with_pool(pool: WorkerPool) -> Self {
        Self {
            pool,
            phase: JobPhase::Planned,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Maximum items in flight.
    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Run `work` on every item and collect the outcomes.
    ///
    /// Item failures and panics are captured in the returned
    /// [`JobResult`]; only a failure to start the pool itself is returned
    /// as an error.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::WorkerPool`] if the thread pool cannot be built.
    pub fn run<W, T, F>(
        &mut self,
        context: &JobContext,
        items: Vec<W>,
        work: F,
    ) -> Result<JobResult<T>, SiftError>
    where
        W: Send,
        T: Send,
        F: Fn(W) -> Result<T, SiftError> + Send + Sync,
    {
        self.phase = JobPhase::Planned;
        let total = items.len();
        let dispatched_at = Instant::now();

        log::debug!(
            "{}: dispatching {total} item(s) on {} worker(s) ({:?})",
            context.label(),
            self.pool.workers(),
            self.pool.policy()
        );
        self.phase = JobPhase::Dispatched;

        let outcomes = self.pool.map(items, |index, item| ChunkOutcome {
            index,
            result: run_isolated(&work, item, index, total),
        })?;

        self.phase = JobPhase::Aggregated;
        let result = JobResult {
            outcomes,
            elapsed: dispatched_at.elapsed(),
        };

        for error in result.errors() {
            log::warn!("{}: {error}", context.label());
        }
        log::debug!(
            "{}: {} of {total} item(s) succeeded in {:?}",
            context.label(),
            result.succeeded(),
            result.elapsed()
        );

        Ok(result)
    }
}

fn run_isolated<W, T, F>(work: &F, item: W, index: usize, total: usize) -> Result<T, SiftError>
where
    F: Fn(W) -> Result<T, SiftError>,
{
    let failure = |message: String| SiftError::ChunkFailure {
        index: index + 1,
        total,
        message,
    };

    match catch_unwind(AssertUnwindSafe(|| work(item))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(failure(error.to_string())),
        Err(payload) => Err(failure(format!(
            "worker panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_isolated() {
        let context = JobContext::new("test");
        for policy in [ConcurrencyPolicy::Threads, ConcurrencyPolicy::Inline] {
            let mut coordinator = DispatchCoordinator::new(policy, 4);
            let result = coordinator
                .run(&context, (0..10).collect(), |n: usize| {
                    if n % 4 == 1 {
                        Err(SiftError::VideoDecode(format!("bad chunk {n}")))
                    } else {
                        Ok(n)
                    }
                })
                .unwrap();
            assert_eq!(result.succeeded(), 7);
            assert_eq!(result.failed(), 3);
            assert_eq!(coordinator.phase(), JobPhase::Aggregated);
            let values: Vec<usize> = result.values().copied().collect();
            assert_eq!(values, vec![0, 2, 3, 4, 6, 7, 8]);
        }
    }

    #[test]
    fn panics_become_chunk_failures() {
        let context = JobContext::new("test");
        let mut coordinator = DispatchCoordinator::new(ConcurrencyPolicy::Threads, 2);
        let result = coordinator
            .run(&context, vec![1, 2, 3], |n: u32| {
                if n == 2 {
                    panic!("boom");
                }
                Ok(n)
            })
            .unwrap();
        assert_eq!(result.succeeded(), 2);
        let error = result.errors().next().unwrap();
        match error {
            SiftError::ChunkFailure {
                index,
                total,
                message,
            } => {
                assert_eq!((*index, *total), (2, 3));
                assert!(message.contains("boom"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pool_preserves_item_order() {
        let pool = WorkerPool::new(ConcurrencyPolicy::Threads, 3);
        let doubled = pool.map((0..50u32).collect(), |_, n| n * 2).unwrap();
        assert_eq!(doubled, (0..50u32).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_job_aggregates_nothing() {
        let mut coordinator = DispatchCoordinator::new(ConcurrencyPolicy::Threads, 0);
        assert_eq!(coordinator.workers(), 1);
        let result = coordinator
            .run(&JobContext::new("empty"), Vec::<u8>::new(), |n| Ok(n))
            .unwrap();
        assert!(result.is_success());
        assert!(result.outcomes().is_empty());
    }
}
