//! Async task execution pool.
//!
//! Provides a thread pool for executing async tasks in parallel. The load
//! throttler and the texture cache run their background tasks here.

use std::future::Future;
use std::sync::Arc;
use std::thread;

use async_executor::{Executor, Task};

/// A thread pool for executing async tasks.
///
/// Each thread drives the shared executor until the pool is shut down, so
/// idle threads park instead of polling.
///
/// # Example
///
/// ```ignore
/// use vellum_core::TaskPool;
///
/// let pool = TaskPool::new(4);
///
/// let task = pool.spawn(async { 42 });
///
/// let result = pollster::block_on(task);
/// assert_eq!(result, 42);
/// ```
pub struct TaskPool {
    executor: Arc<Executor<'static>>,
    threads: Vec<thread::JoinHandle<()>>,
    shutdown: Option<flume::Sender<()>>,
}

impl TaskPool {
    /// Create a new task pool with the specified number of threads.
    ///
    /// # Panics
    ///
    /// Panics if num_threads is 0 or a thread cannot be spawned.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "TaskPool must have at least one thread");

        let executor = Arc::new(Executor::new());
        let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);
        let mut threads = Vec::with_capacity(num_threads);

        for i in 0..num_threads {
            let exec = executor.clone();
            let shutdown_rx = shutdown_rx.clone();

            let handle = thread::Builder::new()
                .name(format!("vellum-task-{}", i))
                .spawn(move || {
                    // Resolves once the sender is dropped.
                    let _ = futures_lite::future::block_on(exec.run(shutdown_rx.recv_async()));
                })
                .expect("Failed to spawn task pool thread");

            threads.push(handle);
        }

        tracing::debug!("TaskPool created with {} threads", num_threads);

        Self {
            executor,
            threads,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Create a task pool using the number of available CPU cores.
    pub fn with_num_cpus() -> Self {
        Self::new(num_cpus::get().max(1))
    }

    /// Create a task pool with a default number of threads.
    ///
    /// Uses max(1, num_cpus - 1) to leave one core free for the frame thread.
    pub fn default_threads() -> Self {
        let num_threads = (num_cpus::get().saturating_sub(1)).max(1);
        Self::new(num_threads)
    }

    /// Spawn an async task on the pool.
    ///
    /// Returns a `Task` that can be awaited to get the result. Dropping the
    /// `Task` cancels it; call [`Task::detach`] to let it run to completion.
    pub fn spawn<T>(&self, future: impl Future<Output = T> + Send + 'static) -> Task<T>
    where
        T: Send + 'static,
    {
        self.executor.spawn(future)
    }

    /// Spawn a task whose result nobody waits for.
    pub fn spawn_detached(&self, future: impl Future<Output = ()> + Send + 'static) {
        self.executor.spawn(future).detach();
    }

    /// Get the number of threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Shutdown the task pool and wait for all threads to finish.
    ///
    /// Tasks that have not completed yet are dropped with the executor.
    pub fn shutdown(mut self) {
        tracing::debug!("Shutting down TaskPool with {} threads", self.threads.len());

        self.shutdown.take();

        let threads = std::mem::take(&mut self.threads);
        for handle in threads {
            if let Err(e) = handle.join() {
                tracing::error!("Task pool thread panicked: {:?}", e);
            }
        }

        tracing::debug!("TaskPool shutdown complete");
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::default_threads()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Threads exit on their own once the channel disconnects.
        self.shutdown.take();
    }
}
