use crate::job::Job;
use crate::runtime::scheduler::Scheduler;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Scheduler driven by the current thread.
    ///
    /// Set for the whole lifetime of a run-loop so that timers and spawns
    /// reach the scheduler without explicit parameter passing.
    static CURRENT_SCHEDULER: RefCell<Option<Arc<Scheduler>>> =
        const { RefCell::new(None) };

    /// Job whose body is being polled on the current thread.
    ///
    /// Spawned tasks become children of this job; scopes temporarily
    /// replace it with their own job while their body is polled.
    static CURRENT_JOB: RefCell<Option<Arc<Job>>> =
        const { RefCell::new(None) };
}

/// Runs `f` with `scheduler` installed as the current scheduler, restoring
/// the previous one afterwards.
pub(crate) fn enter_scheduler<R>(scheduler: Arc<Scheduler>, f: impl FnOnce() -> R) -> R {
    CURRENT_SCHEDULER.with(|cell| {
        let prev = cell.replace(Some(scheduler));
        let out = f();
        cell.replace(prev);
        out
    })
}

/// Runs `f` with `job` installed as the current job.
///
/// The previous job is restored by a guard, so a panic unwinding out of a
/// task body never leaves a stale job behind.
pub(crate) fn enter_job<R>(job: Arc<Job>, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Arc<Job>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let prev = self.0.take();
            CURRENT_JOB.with(|cell| {
                cell.replace(prev);
            });
        }
    }

    let _restore = Restore(CURRENT_JOB.with(|cell| cell.replace(Some(job))));
    f()
}

pub(crate) fn current_scheduler() -> Option<Arc<Scheduler>> {
    CURRENT_SCHEDULER.with(|cell| cell.borrow().clone())
}

pub(crate) fn current_job() -> Option<Arc<Job>> {
    CURRENT_JOB.with(|cell| cell.borrow().clone())
}
