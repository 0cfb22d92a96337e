use super::builder::RuntimeBuilder;
use super::scheduler::worker::Worker;
use super::scheduler::{FailureHandler, Scheduler};
use super::task::{Builder, JoinHandle};
use crate::error::Error;

use std::io;
use std::sync::Arc;
use std::thread;

/// The main runtime handle.
///
/// Tasks spawned through [`spawn`](Self::spawn) are roots: they have no
/// parent, and an unhandled failure in one of them is passed to the
/// runtime's uncaught failure handler.
///
/// Dropping the runtime stops its helper threads and drops every task that
/// has not completed.
pub struct Runtime {
    scheduler: Arc<Scheduler>,

    /// Helper threads, when more than one worker thread is configured.
    helpers: Vec<thread::JoinHandle<()>>,
}

impl Runtime {
    pub(crate) fn new(
        worker_threads: usize,
        thread_name: &str,
        failure_handler: FailureHandler,
    ) -> io::Result<Self> {
        let scheduler = Arc::new(Scheduler::new(failure_handler));
        let mut runtime = Self {
            scheduler,
            helpers: Vec::with_capacity(worker_threads - 1),
        };

        for index in 1..worker_threads {
            let scheduler = runtime.scheduler.clone();

            let handle = thread::Builder::new()
                .name(format!("{thread_name}-{index}"))
                .spawn(move || Worker::new(scheduler).run_until(|| false))?;

            runtime.helpers.push(handle);
        }

        tracing::debug!(worker_threads, "runtime started");
        Ok(runtime)
    }

    /// Shorthand for [`RuntimeBuilder::new`].
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Spawns `future` as a root task.
    ///
    /// The task starts running once a thread drives the runtime through
    /// [`block_on`](Self::block_on) or [`run`](Self::run), or right away on
    /// the helper threads.
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Builder::new().spawn_root(self.scheduler.clone(), future)
    }

    /// Spawns `future` as a root task configured by `builder`.
    pub fn spawn_with<F, T>(&self, builder: Builder, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        builder.spawn_root(self.scheduler.clone(), future)
    }

    /// Runs `future` as a root task and drives the runtime on the current
    /// thread until that task is terminal.
    ///
    /// Other tasks keep their state across calls: those still running when
    /// this returns resume at the next `block_on` or `run`.
    ///
    /// # Errors
    ///
    /// Returns the task's cancellation or failure.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let runtime = Runtime::builder().build()?;
    /// let value = runtime.block_on(async { 42 })?;
    /// assert_eq!(value, 42);
    /// ```
    pub fn block_on<F, T>(&self, future: F) -> Result<T, Error>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.spawn(future);
        let root = handle.task.job.clone();

        Worker::new(self.scheduler.clone()).run_until(|| root.is_terminal());

        handle
            .take_result()
            .unwrap_or_else(|| Err(Error::Cancelled(Arc::from("runtime shut down"))))
    }

    /// Drives the runtime on the current thread until every task is terminal
    /// and the ready queue is empty.
    pub fn run(&self) {
        let scheduler = self.scheduler.clone();
        Worker::new(self.scheduler.clone()).run_until(move || scheduler.live_jobs() == 0);
    }

    /// Number of tasks and scopes that are not terminal yet.
    pub fn live_tasks(&self) -> usize {
        self.scheduler.live_jobs()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.scheduler.shutdown();

        for handle in self.helpers.drain(..) {
            let _ = handle.join();
        }
    }
}
