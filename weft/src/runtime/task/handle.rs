use super::Task;
use crate::error::{Cause, Error, Outcome};
use crate::job::{Job, JobId, JobState};

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A handle to a spawned task.
///
/// Awaiting the handle resolves once the task is terminal, that is once its
/// body and all of its children are done:
///
/// - `Ok(value)` if it completed;
/// - `Err(Error::Cancelled)` if it was cancelled;
/// - `Err(Error::Failed)` if its body (or a child) failed.
///
/// Dropping the handle neither cancels nor detaches the task: it stays a
/// child of the task that spawned it.
///
/// # Panics
///
/// The output is moved out when the handle resolves to `Ok`. Polling the
/// handle again after that panics; use [`join`](Self::join) or
/// [`outcome`](Self::outcome) to observe a task more than once.
pub struct JoinHandle<T> {
    pub(crate) task: Arc<Task<T>>,
}

impl<T> JoinHandle<T> {
    fn job(&self) -> &Arc<Job> {
        &self.task.job
    }

    /// Identifier of the task.
    pub fn id(&self) -> JobId {
        self.job().id()
    }

    /// Name given at spawn time, if any.
    pub fn name(&self) -> Option<&str> {
        self.job().name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.job().state()
    }

    /// Returns `true` once the task is `Cancelled` or `Completed`.
    pub fn is_finished(&self) -> bool {
        self.job().is_terminal()
    }

    /// Number of live children of the task.
    pub fn child_count(&self) -> usize {
        self.job().child_count()
    }

    /// Requests cancellation of the task and all of its descendants.
    ///
    /// The task observes the request at its next suspension point. Its parent
    /// is not affected. Cancelling a terminal task does nothing.
    pub fn cancel(&self) {
        self.cancel_with("cancelled");
    }

    /// Same as [`cancel`](Self::cancel), recording `reason` as the cause.
    pub fn cancel_with(&self, reason: impl Into<String>) {
        self.job().cancel(Cause::cancelled(reason));
    }

    /// Registers `callback` to run once, when the task becomes terminal.
    ///
    /// If the task is already terminal, the callback runs immediately on the
    /// calling thread.
    pub fn invoke_on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        self.job().invoke_on_completion(Box::new(callback));
    }

    /// Waits for the task to become terminal without taking its output.
    pub fn join(&self) -> Join<'_> {
        Join { job: self.job() }
    }

    /// Terminal outcome of the task, or `None` while it is still live.
    pub fn outcome(&self) -> Option<Outcome> {
        self.job().outcome()
    }

    /// Takes the result of a terminal task.
    pub(crate) fn take_result(&self) -> Option<Result<T, Error>> {
        let outcome = self.job().outcome()?;
        Some(self.resolve(outcome))
    }

    fn resolve(&self, outcome: Outcome) -> Result<T, Error> {
        match outcome {
            Ok(()) => Ok(self
                .task
                .output
                .lock()
                .unwrap()
                .take()
                .expect("JoinHandle polled after completion")),
            Err(cause) => Err(cause.into()),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.job().poll_terminal(cx) {
            Poll::Ready(outcome) => Poll::Ready(self.resolve(outcome)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Future returned by [`JoinHandle::join`].
pub struct Join<'a> {
    job: &'a Job,
}

impl Future for Join<'_> {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        self.job.poll_terminal(cx)
    }
}
