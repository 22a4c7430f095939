//! Process-level configuration for Vellum.

use crate::logging::DEFAULT_FILTER;

/// Process-level settings shared by every Vellum subsystem.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of task-pool threads. `None` uses `max(1, num_cpus - 1)`.
    pub task_threads: Option<usize>,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Whether puffin scopes should be recorded.
    pub profiling: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            task_threads: None,
            log_filter: DEFAULT_FILTER.to_string(),
            profiling: false,
        }
    }
}

impl Config {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed number of task-pool threads.
    pub fn with_task_threads(mut self, threads: usize) -> Self {
        self.task_threads = Some(threads);
        self
    }

    /// Set the default tracing filter.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Enable or disable puffin scopes.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Resolved task-pool thread count.
    pub fn resolved_task_threads(&self) -> usize {
        self.task_threads
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}
