use super::state::JobState;
use super::{JobId, JobKind};
use crate::error::{Cause, Failure, Outcome};
use crate::runtime::scheduler::Scheduler;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};

/// Callback invoked once when a job reaches a terminal state.
pub(crate) type Callback = Box<dyn FnOnce(&Outcome) + Send>;

/// A node of the task tree.
///
/// A `Job` owns the lifecycle of one unit of work: its state, its children,
/// its cancellation cause and its completion callbacks. The code that
/// actually runs (a spawned [`Task`](crate::runtime::task::Task) or an inline
/// scope) reports to the job through [`finish_body`](Self::finish_body) and
/// [`body_failed`](Self::body_failed); everything else is driven by the tree.
///
/// Children are owned (`Arc`), the parent is only referenced weakly.
pub(crate) struct Job {
    id: JobId,
    name: Option<Arc<str>>,
    kind: JobKind,
    supervisor: bool,

    /// Back-link to the parent. Never owns.
    parent: Option<Weak<Job>>,

    /// Number of non-cancellable regions currently entered on this job.
    shield: AtomicUsize,

    scheduler: Arc<Scheduler>,

    inner: Mutex<Inner>,
}

struct Inner {
    state: JobState,

    /// First cancellation or failure cause. Set once.
    cause: Option<Cause>,

    /// The job's own body has finished, failed or been abandoned.
    body_done: bool,

    children: Vec<Arc<Job>>,
    callbacks: Vec<Callback>,

    /// Wakers of tasks joining this job.
    joiners: Vec<Waker>,

    /// Waker of the continuation running the body, woken on cancellation.
    waker: Option<Waker>,
}

impl Job {
    /// Creates a job in the `New` state. The job is not attached to its
    /// parent yet, see [`attach`](Self::attach).
    pub(crate) fn new(
        scheduler: Arc<Scheduler>,
        parent: Option<&Arc<Job>>,
        kind: JobKind,
        supervisor: bool,
        name: Option<Arc<str>>,
    ) -> Arc<Self> {
        let id = scheduler.next_job_id();
        scheduler.job_created();

        Arc::new(Self {
            id,
            name,
            kind,
            supervisor,
            parent: parent.map(Arc::downgrade),
            shield: AtomicUsize::new(0),
            scheduler,
            inner: Mutex::new(Inner {
                state: JobState::New,
                cause: None,
                body_done: false,
                children: Vec::new(),
                callbacks: Vec::new(),
                joiners: Vec::new(),
                waker: None,
            }),
        })
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn kind(&self) -> JobKind {
        self.kind
    }

    pub(crate) fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub(crate) fn parent(&self) -> Option<Arc<Job>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn state(&self) -> JobState {
        self.inner.lock().unwrap().state
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.inner.lock().unwrap().children.len()
    }

    /// Terminal outcome, or `None` while the job is still live.
    pub(crate) fn outcome(&self) -> Option<Outcome> {
        let inner = self.inner.lock().unwrap();
        outcome_of(&inner)
    }

    /// The job whose task polls this job's body.
    ///
    /// Scope jobs run inline inside their caller, so the owner is the first
    /// ancestor that is a spawned task.
    pub(crate) fn owner(self: &Arc<Self>) -> Arc<Job> {
        let mut current = self.clone();

        while current.kind == JobKind::Scope {
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        current
    }

    /// Registers `child` under this job.
    ///
    /// Returns `false` when this job no longer accepts children (it is
    /// cancelling or terminal); the caller must then cancel the child.
    pub(crate) fn attach(&self, child: &Arc<Job>) -> bool {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            JobState::New | JobState::Active | JobState::Completing => {
                inner.children.push(child.clone());
                true
            }
            _ => false,
        }
    }

    /// Moves a freshly created job from `New` to `Active`.
    ///
    /// A job cancelled while still `New` stays on the cancelling path.
    pub(crate) fn activate(&self) {
        let mut inner = self.inner.lock().unwrap();

        if inner.state == JobState::New {
            transition(self.id, &mut inner, JobState::Active);
        }
    }

    /// Requests cancellation of the job and, recursively, of its children.
    ///
    /// Idempotent: only the first request records its cause.
    pub(crate) fn cancel(&self, cause: Cause) {
        self.request_stop(cause);
    }

    /// Records `cause`, moves to `Cancelling` and cancels all children.
    ///
    /// Returns `false` if a cause was already recorded or the job is
    /// terminal.
    fn request_stop(&self, cause: Cause) -> bool {
        let (waker, children, for_children) = {
            let mut inner = self.inner.lock().unwrap();

            if inner.cause.is_some() || inner.state.is_terminal() {
                return false;
            }

            let for_children = cause_for_children(&cause);
            inner.cause = Some(cause);
            transition(self.id, &mut inner, JobState::Cancelling);

            (inner.waker.clone(), inner.children.clone(), for_children)
        };

        tracing::debug!(job = %self.id, cause = %for_children, "cancellation requested");

        if let Some(waker) = waker {
            waker.wake();
        }

        for child in children {
            child.cancel(for_children.clone());
        }

        self.try_finish();
        true
    }

    /// Marks the body as finished: returned, abandoned after cancellation, or
    /// never started.
    pub(crate) fn finish_body(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.body_done = true;
            inner.waker = None;
        }

        self.try_finish();
    }

    /// Records an unhandled failure of the job's own body.
    pub(crate) fn body_failed(&self, failure: Failure) {
        tracing::debug!(job = %self.id, %failure, "task body failed");

        if self.request_stop(Cause::Failed(failure.clone())) {
            self.escalate(&failure);
        } else {
            // Already cancelled: the failure cannot become the cause, but it
            // must not be lost either.
            self.scheduler.report_failure(self, &failure);
        }

        self.finish_body();
    }

    /// Hands a recorded failure to the parent, or reports it when nobody
    /// above absorbs it.
    fn escalate(&self, failure: &Failure) {
        if self.kind == JobKind::Scope {
            // Surfaces as the scope's `Err` to the caller.
            return;
        }

        match self.parent() {
            Some(parent) if parent.absorb_child_failure(failure) => {}
            _ => self.scheduler.report_failure(self, failure),
        }
    }

    /// Called by a failing child. Supervisors isolate the failure; other
    /// jobs fail with it, cancelling every other child.
    fn absorb_child_failure(&self, failure: &Failure) -> bool {
        if self.supervisor {
            return false;
        }

        if !self.request_stop(Cause::Failed(failure.clone())) {
            return false;
        }

        self.escalate(failure);
        true
    }

    fn child_terminated(&self, id: JobId) {
        self.inner
            .lock()
            .unwrap()
            .children
            .retain(|child| child.id != id);

        self.try_finish();
    }

    /// Applies the "wait children" rule and performs the terminal transition
    /// once body and children are all done.
    fn try_finish(&self) {
        let (outcome, callbacks, joiners) = {
            let mut inner = self.inner.lock().unwrap();

            if inner.state.is_terminal() || !inner.body_done {
                return;
            }

            if !inner.children.is_empty() {
                if inner.state == JobState::Active {
                    transition(self.id, &mut inner, JobState::Completing);
                }
                return;
            }

            let next = if inner.cause.is_some() {
                JobState::Cancelled
            } else {
                JobState::Completed
            };

            transition(self.id, &mut inner, next);
            inner.waker = None;

            let outcome = match &inner.cause {
                Some(cause) => Err(cause.clone()),
                None => Ok(()),
            };

            (
                outcome,
                std::mem::take(&mut inner.callbacks),
                std::mem::take(&mut inner.joiners),
            )
        };

        for callback in callbacks {
            self.run_callback(callback, &outcome);
        }

        for waker in joiners {
            waker.wake();
        }

        if let Some(parent) = self.parent() {
            parent.child_terminated(self.id);
        }

        self.scheduler.job_terminated();
    }

    /// Runs a completion callback. A panic in the callback is reported as an
    /// uncaught failure and does not stop the terminal transition.
    fn run_callback(&self, callback: Callback, outcome: &Outcome) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
            let failure = Failure::from_panic(payload);
            tracing::debug!(job = %self.id, %failure, "completion callback panicked");
            self.scheduler.report_failure(self, &failure);
        }
    }

    /// Registers a terminal-state callback. Runs it immediately if the job
    /// already terminated.
    pub(crate) fn invoke_on_completion(&self, callback: Callback) {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();

            match outcome_of(&inner) {
                Some(outcome) => outcome,
                None => {
                    inner.callbacks.push(callback);
                    return;
                }
            }
        };

        callback(&outcome);
    }

    /// Resolves once the job is terminal.
    ///
    /// The waker is registered under the same lock that checks the state, so
    /// a terminal transition cannot be missed.
    pub(crate) fn poll_terminal(&self, cx: &mut Context<'_>) -> Poll<Outcome> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(outcome) = outcome_of(&inner) {
            return Poll::Ready(outcome);
        }

        if !inner.joiners.iter().any(|w| w.will_wake(cx.waker())) {
            inner.joiners.push(cx.waker().clone());
        }

        Poll::Pending
    }

    /// Records the waker of the continuation running the body.
    pub(crate) fn set_waker(&self, waker: &Waker) {
        let mut inner = self.inner.lock().unwrap();

        if inner.body_done {
            return;
        }

        match &inner.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => inner.waker = Some(waker.clone()),
        }
    }

    /// Returns `true` when the body must be dropped at this suspension point:
    /// cancellation was requested and no non-cancellable region is active.
    pub(crate) fn should_abandon_body(&self) -> bool {
        if self.is_shielded() {
            return false;
        }

        let inner = self.inner.lock().unwrap();
        inner.cause.is_some() && !inner.body_done
    }

    /// Cancellation cause, once requested.
    pub(crate) fn cause(&self) -> Option<Cause> {
        self.inner.lock().unwrap().cause.clone()
    }

    pub(crate) fn is_shielded(&self) -> bool {
        self.shield.load(Ordering::Acquire) > 0
    }

    pub(crate) fn shield(&self) {
        self.shield.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unshield(&self) {
        self.shield.fetch_sub(1, Ordering::AcqRel);
    }
}

fn outcome_of(inner: &Inner) -> Option<Outcome> {
    if !inner.state.is_terminal() {
        return None;
    }

    Some(match &inner.cause {
        Some(cause) => Err(cause.clone()),
        None => Ok(()),
    })
}

fn transition(id: JobId, inner: &mut Inner, next: JobState) {
    debug_assert!(
        inner.state.can_transition_to(next),
        "illegal transition {} -> {next} for {id}",
        inner.state
    );

    tracing::trace!(job = %id, from = %inner.state, to = %next, "job transition");
    inner.state = next;
}

/// The cause handed down to children of a cancelling job.
///
/// Children are cancelled, never failed: only the job whose body failed
/// carries the failure.
fn cause_for_children(cause: &Cause) -> Cause {
    match cause {
        Cause::Cancelled(reason) => Cause::Cancelled(reason.clone()),
        Cause::Failed(failure) => Cause::cancelled(format!("parent failed: {failure}")),
    }
}
