use super::Runtime;
use super::scheduler::{FailureHandler, FailureReport, log_failure};

use std::fmt;
use std::io;
use std::sync::Arc;

const DEFAULT_THREAD_NAME: &str = "weft-worker";

/// Builder for configuring and creating a [`Runtime`].
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .worker_threads(4)
///     .thread_name("ingest")
///     .on_uncaught_failure(|report| eprintln!("{}: {}", report.job, report.failure))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    /// Threads driving the scheduler, the caller of `block_on` included.
    worker_threads: usize,

    /// Prefix of the helper threads' names.
    thread_name: String,

    failure_handler: FailureHandler,
}

impl RuntimeBuilder {
    /// Creates a builder for a single-threaded runtime: everything runs on
    /// the thread calling [`Runtime::block_on`] or [`Runtime::run`].
    ///
    /// Uncaught failures are logged through `tracing` at error level.
    pub fn new() -> Self {
        Self {
            worker_threads: 1,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            failure_handler: Arc::new(log_failure),
        }
    }

    /// Sets the number of threads driving the runtime.
    ///
    /// `n - 1` helper threads are started; the thread blocking on the
    /// runtime is the remaining one. Ordering between tasks is then only
    /// guaranteed through channels and joins.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Sets the name prefix of helper threads. Threads are named
    /// `{name}-{index}`.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Installs the handler receiving failures that no parent absorbed:
    /// failures of root tasks, of children of supervisors, and failures
    /// raised after a task was already cancelled.
    pub fn on_uncaught_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FailureReport) + Send + Sync + 'static,
    {
        self.failure_handler = Arc::new(handler);
        self
    }

    /// Builds the runtime, starting its helper threads.
    ///
    /// # Errors
    ///
    /// Returns an error if a helper thread cannot be spawned.
    pub fn build(self) -> io::Result<Runtime> {
        Runtime::new(self.worker_threads, &self.thread_name, self.failure_handler)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("worker_threads", &self.worker_threads)
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}
