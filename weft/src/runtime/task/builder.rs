use super::JoinHandle;
use super::core::{Body, submit};
use crate::error::Failure;
use crate::runtime::context::{current_job, current_scheduler};
use crate::runtime::scheduler::Scheduler;

use std::fmt;
use std::sync::Arc;

/// Configures a task before spawning it.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = task::Builder::new()
///     .name("ingest")
///     .supervisor(true)
///     .spawn(async {
///         // children failing here do not cancel their siblings
///     });
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    name: Option<Arc<str>>,
    supervisor: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the task. The name shows up in logs and failure reports.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Arc::from(name.into()));
        self
    }

    /// Makes the task a supervisor: a failing child is reported instead of
    /// failing the task and cancelling the other children.
    pub fn supervisor(mut self, supervisor: bool) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Spawns `future` as a child of the current task.
    ///
    /// A panic in `future` fails the task.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime.
    pub fn spawn<F, T>(self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(Box::pin(async move { Ok(future.await) }))
    }

    /// Spawns a fallible `future`. An `Err` fails the task the same way a
    /// panic does.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime.
    pub fn spawn_try<F, T, E>(self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display,
    {
        self.submit(Box::pin(async move {
            future.await.map_err(|err| Failure::new(err.to_string()))
        }))
    }

    fn submit<T: Send + 'static>(self, body: Body<T>) -> JoinHandle<T> {
        let scheduler =
            current_scheduler().expect("spawn must be called within the context of a runtime");

        submit(scheduler, current_job(), self.supervisor, self.name, body)
    }

    /// Spawns a root task directly on `scheduler`.
    pub(crate) fn spawn_root<F, T>(
        self,
        scheduler: Arc<Scheduler>,
        future: F,
    ) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        submit(
            scheduler,
            None,
            self.supervisor,
            self.name,
            Box::pin(async move { Ok(future.await) }),
        )
    }
}
