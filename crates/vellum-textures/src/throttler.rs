//! Priority-ordered, bounded-concurrency load scheduling.
//!
//! The throttler keeps at most `W` load functions running at once, where `W`
//! defaults to `min(64, logical cores)`. Submissions flow through two channels:
//!
//! 1. An intake channel, drained in batches by a single adder task that moves
//!    new items into the shared pending list and then emits one wake token
//!    per item.
//! 2. A wake-token channel, read by `W` worker tasks. A worker that receives a
//!    token scans the pending list for the highest-priority item (dropping
//!    cancelled items along the way), runs it, and goes back to waiting.
//!
//! Separating "work exists" from "work runs" lets any idle worker claim any
//! item, and lets priority be decided at the moment a worker becomes free
//! rather than at submission time.

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use async_executor::Task;
use futures_lite::FutureExt;
use parking_lot::{Mutex, RwLock};
use vellum_core::TaskPool;
use vellum_core::profiling::profile_function;

use crate::basis::{ThrottleBasisProvider, compare_priority};
use crate::cancel::CancellationToken;
use crate::error::{TextureError, TextureResult};

/// Upper bound on the number of workers.
pub const MAX_WORKERS: usize = 64;

const THROTTLER_NAME: &str = "LoadThrottler";

/// Default worker count: `min(64, logical cores)`.
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}

/// Configuration for a [`LoadThrottler`].
#[derive(Debug, Clone)]
pub struct ThrottlerConfig {
    /// Number of concurrent load workers, clamped to `1..=64`.
    pub workers: usize,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
        }
    }
}

impl ThrottlerConfig {
    /// Create a configuration with the default worker count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Worker count after clamping.
    pub fn resolved_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }
}

/// Future resolving to the result of a throttled load.
///
/// Resolves to the load function's value or error, or to
/// [`TextureError::Cancelled`] if the item was cancelled before it ran.
pub struct LoadFuture<T> {
    inner: Pin<Box<dyn Future<Output = TextureResult<T>> + Send + 'static>>,
}

impl<T: Send + 'static> LoadFuture<T> {
    fn from_receiver(receiver: flume::Receiver<TextureResult<T>>) -> Self {
        Self {
            inner: Box::pin(async move {
                receiver
                    .recv_async()
                    .await
                    .unwrap_or(Err(TextureError::Disposed {
                        what: THROTTLER_NAME,
                    }))
            }),
        }
    }

    /// A future that is already resolved.
    pub fn ready(result: TextureResult<T>) -> Self {
        Self {
            inner: Box::pin(async move { result }),
        }
    }
}

impl<T> Future for LoadFuture<T> {
    type Output = TextureResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for LoadFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture").finish_non_exhaustive()
    }
}

/// Counters describing throttler activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottlerStats {
    /// Items accepted by [`LoadThrottler::create_loader`].
    pub submitted: u64,
    /// Items whose load function returned a value.
    pub completed: u64,
    /// Items whose load function returned an error or panicked.
    pub failed: u64,
    /// Items that ended cancelled, whether or not they started.
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy)]
enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

type OutcomeFuture = Pin<Box<dyn Future<Output = JobOutcome> + Send + 'static>>;

/// A type-erased load function together with its result sender.
trait ErasedJob: Send {
    /// Run the load function and deliver its result.
    fn run(self: Box<Self>, token: CancellationToken) -> OutcomeFuture;

    /// Deliver [`TextureError::Cancelled`] without running.
    fn cancel(self: Box<Self>);
}

struct Job<T, F> {
    load: F,
    result: flume::Sender<TextureResult<T>>,
}

impl<T, F, Fut> ErasedJob for Job<T, F>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = TextureResult<T>> + Send + 'static,
{
    fn run(self: Box<Self>, token: CancellationToken) -> OutcomeFuture {
        let Job { load, result } = *self;

        Box::pin(async move {
            let value = guarded("throttled load", async move { load(token).await }).await;

            let outcome = match &value {
                Ok(_) => JobOutcome::Completed,
                Err(err) if err.is_cancelled() => JobOutcome::Cancelled,
                Err(err) => {
                    tracing::warn!("Throttled load failed: {}", err);
                    JobOutcome::Failed
                }
            };

            // The caller may have dropped its future; that is not an error.
            let _ = result.send(value);
            outcome
        })
    }

    fn cancel(self: Box<Self>) {
        let _ = self.result.send(Err(TextureError::Cancelled));
    }
}

/// Await `future`, turning a panic into [`TextureError::LoadFailed`].
pub(crate) async fn guarded<T>(
    key: &str,
    future: impl Future<Output = TextureResult<T>> + Send,
) -> TextureResult<T> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => Err(TextureError::load_failed(key, panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("load function panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("load function panicked: {}", message)
    } else {
        "load function panicked".to_string()
    }
}

/// One pending load request.
struct WorkItem {
    /// Submission order, used as the final tie-break.
    sequence: u64,
    basis: Arc<dyn ThrottleBasisProvider>,
    cancel: CancellationToken,
    job: Box<dyn ErasedJob>,
}

impl WorkItem {
    fn compare(&self, other: &WorkItem) -> CmpOrdering {
        compare_priority(self.basis.as_ref(), other.basis.as_ref())
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

#[derive(Default)]
struct StatCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl StatCounters {
    fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed => &self.completed,
            JobOutcome::Failed => &self.failed,
            JobOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ThrottlerStats {
        ThrottlerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the adder and the workers.
struct Shared {
    pending: Mutex<Vec<WorkItem>>,
    shutdown: CancellationToken,
    stats: StatCounters,
}

impl Shared {
    /// Remove and return the highest-priority pending item.
    ///
    /// Cancelled items met during the scan are removed and completed as
    /// cancelled. Removal swaps the last element into the hole, which only
    /// ever moves an element that has not been visited yet.
    fn take_highest_priority(&self) -> Option<WorkItem> {
        profile_function!();
        let mut pending = self.pending.lock();

        let mut best: Option<usize> = None;
        let mut i = 0;
        while i < pending.len() {
            if pending[i].cancel.is_cancelled() {
                let item = pending.swap_remove(i);
                tracing::trace!(sequence = item.sequence, "dropping cancelled load");
                item.job.cancel();
                self.stats.record(JobOutcome::Cancelled);
                continue;
            }

            let better = match best {
                None => true,
                Some(b) => pending[i].compare(&pending[b]) == CmpOrdering::Less,
            };
            if better {
                best = Some(i);
            }
            i += 1;
        }

        best.map(|index| pending.swap_remove(index))
    }

    fn cancel_all_pending(&self) {
        let leftovers = std::mem::take(&mut *self.pending.lock());
        for item in leftovers {
            item.job.cancel();
            self.stats.record(JobOutcome::Cancelled);
        }
    }
}

async fn adder_loop(
    shared: Arc<Shared>,
    intake: flume::Receiver<WorkItem>,
    tokens: flume::Sender<()>,
) {
    let mut batch = Vec::new();

    while let Ok(first) = intake.recv_async().await {
        batch.push(first);
        batch.extend(intake.try_iter());

        let count = batch.len();
        shared.pending.lock().append(&mut batch);

        for _ in 0..count {
            if tokens.send(()).is_err() {
                break;
            }
        }
        tracing::trace!(count, "queued throttled loads");
    }

    tracing::trace!("throttler intake closed");
}

async fn worker_loop(index: usize, shared: Arc<Shared>, tokens: flume::Receiver<()>) {
    while tokens.recv_async().await.is_ok() {
        let Some(item) = shared.take_highest_priority() else {
            // Spurious wake: the item this token announced was taken or
            // cancelled during an earlier scan.
            continue;
        };

        if shared.shutdown.is_cancelled() {
            item.job.cancel();
            shared.stats.record(JobOutcome::Cancelled);
            continue;
        }

        tracing::trace!(worker = index, sequence = item.sequence, "running throttled load");

        let token = if item.cancel.can_be_cancelled() {
            CancellationToken::linked(&[&shared.shutdown, &item.cancel])
        } else {
            shared.shutdown.clone()
        };

        let outcome = item.job.run(token).await;
        shared.stats.record(outcome);
    }

    tracing::trace!(worker = index, "throttler worker exiting");
}

/// Bounded-concurrency scheduler for expensive texture loads.
///
/// # Example
///
/// ```ignore
/// let pool = TaskPool::new(4);
/// let throttler = LoadThrottler::new(ThrottlerConfig::default(), &pool);
///
/// let future = throttler.create_loader(
///     Arc::new(ThrottleBasis::eager_now()),
///     |cancel| async move {
///         cancel.check()?;
///         Ok(42)
///     },
///     CancellationToken::none(),
/// );
///
/// assert_eq!(pollster::block_on(future), Ok(42));
/// throttler.shutdown();
/// ```
pub struct LoadThrottler {
    shared: Arc<Shared>,
    intake: RwLock<Option<flume::Sender<WorkItem>>>,
    tasks: Mutex<Vec<Task<()>>>,
    workers: usize,
    next_sequence: AtomicU64,
}

impl LoadThrottler {
    /// Create a throttler whose adder and workers run on `pool`.
    pub fn new(config: ThrottlerConfig, pool: &TaskPool) -> Self {
        let workers = config.resolved_workers();
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            stats: StatCounters::default(),
        });

        let (intake_tx, intake_rx) = flume::unbounded();
        let (token_tx, token_rx) = flume::unbounded();

        let mut tasks = Vec::with_capacity(workers + 1);
        tasks.push(pool.spawn(adder_loop(shared.clone(), intake_rx, token_tx)));
        for index in 0..workers {
            tasks.push(pool.spawn(worker_loop(index, shared.clone(), token_rx.clone())));
        }

        tracing::debug!("LoadThrottler started with {} workers", workers);

        Self {
            shared,
            intake: RwLock::new(Some(intake_tx)),
            tasks: Mutex::new(tasks),
            workers,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Submit a load.
    ///
    /// Never blocks and never runs `load` synchronously. `load` receives a
    /// token that fires when either `cancel` or the throttler's shutdown
    /// fires. If `cancel` fires before a worker picks the item up, `load` is
    /// never called and the future resolves to [`TextureError::Cancelled`].
    ///
    /// After [`LoadThrottler::shutdown`], the returned future resolves to
    /// [`TextureError::Disposed`] immediately.
    pub fn create_loader<T, F, Fut>(
        &self,
        basis: Arc<dyn ThrottleBasisProvider>,
        load: F,
        cancel: CancellationToken,
    ) -> LoadFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = TextureResult<T>> + Send + 'static,
    {
        let (result_tx, result_rx) = flume::bounded(1);
        let item = WorkItem {
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            basis,
            cancel,
            job: Box::new(Job {
                load,
                result: result_tx,
            }),
        };

        let intake = self.intake.read();
        match intake.as_ref().map(|sender| sender.send(item)) {
            Some(Ok(())) => {
                self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
                LoadFuture::from_receiver(result_rx)
            }
            _ => LoadFuture::ready(Err(TextureError::Disposed {
                what: THROTTLER_NAME,
            })),
        }
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Number of items waiting for a worker.
    ///
    /// Items still in the intake channel are not counted.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Activity counters.
    pub fn stats(&self) -> ThrottlerStats {
        self.shared.stats.snapshot()
    }

    /// Whether [`LoadThrottler::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.intake.read().is_none()
    }

    /// Close the intake and fire the shutdown token without waiting.
    fn signal_shutdown(&self) -> bool {
        let Some(intake) = self.intake.write().take() else {
            return false;
        };
        drop(intake);
        self.shared.shutdown.cancel();
        true
    }

    /// Stop accepting work, cancel everything pending, signal in-flight loads
    /// and wait for the adder and every worker to exit.
    ///
    /// Must not be called from a task running on the throttler's pool.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.signal_shutdown() {
            tracing::debug!("Shutting down LoadThrottler");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }

        futures_lite::future::block_on(async move {
            for task in tasks {
                // `None` if the pool was torn down first.
                let _ = task.fallible().await;
            }
        });

        self.shared.cancel_all_pending();
        tracing::debug!("LoadThrottler shutdown complete");
    }
}

impl Drop for LoadThrottler {
    /// Signals shutdown without waiting; pending items still complete as
    /// cancelled once a worker reaches them. Call [`LoadThrottler::shutdown`]
    /// to wait.
    fn drop(&mut self) {
        if self.signal_shutdown() {
            tracing::debug!("LoadThrottler dropped without shutdown");
        }
        for task in std::mem::take(self.tasks.get_mut()) {
            task.detach();
        }
    }
}

impl fmt::Debug for LoadThrottler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadThrottler")
            .field("workers", &self.workers)
            .field("pending", &self.pending_len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
