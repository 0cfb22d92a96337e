use super::JoinHandle;
use super::state::{DONE, IDLE, NOTIFIED, QUEUED, RUNNING};
use super::waker::make_waker;
use crate::error::{Cause, Failure};
use crate::job::{Job, JobKind};
use crate::runtime::context::enter_job;
use crate::runtime::scheduler::Scheduler;

use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// A unit of work the scheduler can run without knowing its output type.
pub(crate) trait Runnable: Send + Sync {
    /// Polls the work once. Called by whichever thread popped it.
    fn run(self: Arc<Self>);
}

/// A task body: the user future, with its error already turned into a
/// [`Failure`].
pub(crate) type Body<T> = Pin<Box<dyn Future<Output = Result<T, Failure>> + Send>>;

/// The continuation of a spawned task.
///
/// A `Task` polls the body of its [`Job`] and reports back to it. The body
/// is dropped as soon as it returns, fails, or is abandoned at a suspension
/// point after cancellation.
pub(crate) struct Task<T> {
    /// Only touched by the thread that moved `state` to `RUNNING`.
    body: UnsafeCell<Option<Body<T>>>,

    /// Value returned by the body, taken by the join handle.
    pub(crate) output: Mutex<Option<T>>,

    pub(crate) state: AtomicUsize,

    pub(crate) job: Arc<Job>,
}

unsafe impl<T: Send> Send for Task<T> {}
unsafe impl<T: Send> Sync for Task<T> {}

impl<T: Send + 'static> Task<T> {
    fn new(body: Option<Body<T>>, job: Arc<Job>) -> Self {
        let state = if body.is_some() { QUEUED } else { DONE };

        Self {
            body: UnsafeCell::new(body),
            output: Mutex::new(None),
            state: AtomicUsize::new(state),
            job,
        }
    }

    /// Polls the body once.
    ///
    /// - `Pending`: goes back to `IDLE`, or is re-queued if woken meanwhile;
    /// - `Ready(Ok)`: stores the output and finishes the job's body;
    /// - `Ready(Err)` or a panic: fails the job.
    ///
    /// Before and after each poll the job is checked for cancellation; a
    /// cancelled, unshielded body is dropped instead of being resumed.
    pub(crate) fn run(self: Arc<Self>) {
        let current = self.state.load(Ordering::Acquire);

        if current != QUEUED && current != NOTIFIED {
            return;
        }

        if self
            .state
            .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if self.job.should_abandon_body() {
            self.abandon();
            return;
        }

        let waker = make_waker(self.clone());
        self.job.set_waker(&waker);
        let mut cx = Context::from_waker(&waker);

        // Safety: the RUNNING state gives this thread exclusive access.
        let body = unsafe { &mut *self.body.get() };

        let Some(future) = body.as_mut() else {
            self.state.store(DONE, Ordering::Release);
            return;
        };

        let poll = enter_job(self.job.clone(), || {
            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
        });

        match poll {
            Ok(Poll::Pending) => {
                if self.job.should_abandon_body() {
                    self.abandon();
                    return;
                }

                if self
                    .state
                    .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    self.state.store(QUEUED, Ordering::Release);
                    self.job.scheduler().push(self.clone());
                }
            }
            Ok(Poll::Ready(Ok(value))) => {
                *body = None;
                *self.output.lock().unwrap() = Some(value);
                self.state.store(DONE, Ordering::Release);
                self.job.finish_body();
            }
            Ok(Poll::Ready(Err(failure))) => {
                *body = None;
                self.state.store(DONE, Ordering::Release);
                self.job.body_failed(failure);
            }
            Err(payload) => {
                *body = None;
                self.state.store(DONE, Ordering::Release);
                self.job.body_failed(Failure::from_panic(payload));
            }
        }
    }

    /// Drops the body at its current suspension point.
    ///
    /// Must be called while `RUNNING`.
    fn abandon(&self) {
        // Safety: still RUNNING, see `run`.
        let body = unsafe { (*self.body.get()).take() };
        self.state.store(DONE, Ordering::Release);

        tracing::trace!(job = %self.job.id(), "abandoning cancelled task body");

        // Nested scopes cancel their own jobs while being dropped.
        drop(body);
        self.job.finish_body();
    }

    /// Reschedules the task.
    ///
    /// `IDLE` moves to `QUEUED` and is pushed; `RUNNING` moves to `NOTIFIED`
    /// and is re-queued when the current poll returns.
    pub(crate) fn wake(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        let scheduler = self.job.scheduler().clone();
                        scheduler.push(self);
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

impl<T: Send + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        Task::run(self)
    }
}

/// Creates the job and the task for `body`, attaches the job under `parent`
/// and enqueues it.
///
/// A parent that is already cancelling or terminal does not accept new
/// children: the returned handle then refers to an already cancelled task
/// whose body never runs.
pub(crate) fn submit<T>(
    scheduler: Arc<Scheduler>,
    parent: Option<Arc<Job>>,
    supervisor: bool,
    name: Option<Arc<str>>,
    body: Body<T>,
) -> JoinHandle<T>
where
    T: Send + 'static,
{
    let job = Job::new(scheduler.clone(), parent.as_ref(), JobKind::Task, supervisor, name);
    let accepted = parent.as_ref().is_none_or(|parent| parent.attach(&job));

    if !accepted {
        tracing::debug!(job = %job.id(), "parent no longer accepts children");

        job.cancel(Cause::cancelled("parent is no longer active"));
        job.finish_body();

        return JoinHandle {
            task: Arc::new(Task::new(None, job)),
        };
    }

    job.activate();

    tracing::trace!(
        job = %job.id(),
        parent = ?parent.as_ref().map(|parent| parent.id()),
        supervisor,
        "task submitted"
    );

    let task = Arc::new(Task::new(Some(body), job));
    scheduler.push(task.clone());

    JoinHandle { task }
}
