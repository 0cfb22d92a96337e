use crate::error::{Cause, Error};
use crate::job::{Job, JobKind};
use crate::runtime::context::{current_job, current_scheduler, enter_job};

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Runs `future` as an inline child scope of the current task.
///
/// Tasks spawned inside the scope become its children. The scope resolves
/// once `future` and every child are done:
///
/// - if a child fails, the other children are cancelled and the scope
///   resolves to `Err(Error::Failed)` without failing the enclosing task;
/// - if the enclosing task is cancelled, the scope is cancelled with it.
///
/// Unlike a spawned task, the body may borrow from the caller.
///
/// # Panics
///
/// Panics if polled outside of a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let total = weft::task::scope(async {
///     let a = weft::task::spawn(async { 1 });
///     let b = weft::task::spawn(async { 2 });
///     a.await.unwrap() + b.await.unwrap()
/// })
/// .await?;
/// ```
pub fn scope<F: Future>(future: F) -> Scope<F> {
    Scope::new(future, false)
}

/// Like [`scope`], but a failing child does not cancel its siblings nor the
/// scope. The failure is reported to the runtime's uncaught failure handler
/// instead.
pub fn supervisor_scope<F: Future>(future: F) -> Scope<F> {
    Scope::new(future, true)
}

/// Future returned by [`scope`] and [`supervisor_scope`].
pub struct Scope<F: Future> {
    /// `None` once the body returned or was abandoned.
    future: Option<Pin<Box<F>>>,
    output: Option<F::Output>,
    supervisor: bool,

    /// Created on first poll, under the job polling the scope.
    job: Option<Arc<Job>>,
}

// The output is stored by value and never pinned.
impl<F: Future> Unpin for Scope<F> {}

impl<F: Future> Scope<F> {
    fn new(future: F, supervisor: bool) -> Self {
        Self {
            future: Some(Box::pin(future)),
            output: None,
            supervisor,
            job: None,
        }
    }

    /// Cancels the scope and everything running under it.
    pub(crate) fn cancel(&self, cause: Cause) {
        if let Some(job) = &self.job {
            job.cancel(cause);
        }
    }

    fn job(&mut self) -> Arc<Job> {
        if let Some(job) = &self.job {
            return job.clone();
        }

        let scheduler =
            current_scheduler().expect("scope must be polled within the context of a runtime");
        let parent = current_job();

        let job = Job::new(scheduler, parent.as_ref(), JobKind::Scope, self.supervisor, None);

        if parent.as_ref().is_none_or(|parent| parent.attach(&job)) {
            job.activate();
        } else {
            job.cancel(Cause::cancelled("parent is no longer active"));
        }

        self.job = Some(job.clone());
        job
    }

    fn finish_body(&mut self, job: &Job) {
        self.future = None;
        job.finish_body();
    }
}

impl<F: Future> Future for Scope<F> {
    type Output = Result<F::Output, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let job = this.job();

        if job.should_abandon_body() {
            if this.future.is_some() {
                this.finish_body(&job);
            }
        } else if let Some(future) = this.future.as_mut() {
            job.set_waker(cx.waker());

            match enter_job(job.clone(), || future.as_mut().poll(cx)) {
                Poll::Ready(output) => {
                    this.output = Some(output);
                    this.finish_body(&job);
                }
                Poll::Pending if job.should_abandon_body() => this.finish_body(&job),
                Poll::Pending => return Poll::Pending,
            }
        }

        match job.poll_terminal(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(this
                .output
                .take()
                .expect("scope polled after completion"))),
            Poll::Ready(Err(cause)) => Poll::Ready(Err(cause.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F: Future> Drop for Scope<F> {
    fn drop(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };

        if self.future.take().is_some() {
            job.cancel(Cause::cancelled("scope dropped"));
            job.finish_body();
        }
    }
}
