//! Ready and delayed queues shared by every thread driving a runtime.
//!
//! The scheduler is a single FIFO of ready continuations plus a min-heap of
//! delayed ones, both behind one lock. Threads driving the runtime (the
//! caller of [`block_on`](crate::Runtime::block_on) and the optional worker
//! pool) share it through a [`Worker`](worker::Worker) loop.

pub(crate) mod timer;
pub(crate) mod worker;

use crate::error::Failure;
use crate::job::{Job, JobId};
use crate::runtime::task::Runnable;
use timer::TimerEntry;

use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::Waker;
use std::time::Instant;

/// A failure that was not absorbed by any parent.
///
/// Passed to the handler installed with
/// [`RuntimeBuilder::on_uncaught_failure`](crate::RuntimeBuilder::on_uncaught_failure).
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// The task whose failure went unhandled.
    pub job: JobId,

    /// Name given to the task at spawn time, if any.
    pub name: Option<String>,

    /// The failure itself.
    pub failure: Failure,
}

pub(crate) type FailureHandler = Arc<dyn Fn(&FailureReport) + Send + Sync>;

/// Default handler: logs the failure and moves on.
pub(crate) fn log_failure(report: &FailureReport) {
    tracing::error!(
        job = %report.job,
        name = report.name.as_deref().unwrap_or("-"),
        failure = %report.failure,
        "uncaught task failure"
    );
}

/// Outcome of one scheduling step.
pub(crate) enum Step {
    /// A ready continuation to run.
    Run(Arc<dyn Runnable>),

    /// Nothing ran; timers may have become due.
    Tick,

    /// The loop should stop.
    Exit,
}

struct Queues {
    ready: VecDeque<Arc<dyn Runnable>>,
    timers: BinaryHeap<TimerEntry>,
    timer_seq: u64,
    shutdown: bool,
}

pub(crate) struct Scheduler {
    queues: Mutex<Queues>,

    /// Signalled on new ready work, new timers, job termination and shutdown.
    condvar: Condvar,

    next_id: AtomicU64,

    /// Jobs created and not yet terminal.
    live: AtomicUsize,

    failure_handler: FailureHandler,
}

impl Scheduler {
    pub(crate) fn new(failure_handler: FailureHandler) -> Self {
        Self {
            queues: Mutex::new(Queues {
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
                timer_seq: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
            next_id: AtomicU64::new(1),
            live: AtomicUsize::new(0),
            failure_handler,
        }
    }

    pub(crate) fn next_job_id(&self) -> JobId {
        JobId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn job_created(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    /// Called once per job on its terminal transition. Wakes every parked
    /// thread so loops waiting on a job can re-check their exit condition.
    pub(crate) fn job_terminated(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);

        let _queues = self.queues.lock().unwrap();
        self.condvar.notify_all();
    }

    pub(crate) fn live_jobs(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn report_failure(&self, job: &Job, failure: &Failure) {
        let report = FailureReport {
            job: job.id(),
            name: job.name().map(str::to_owned),
            failure: failure.clone(),
        };

        (self.failure_handler)(&report);
    }

    /// Appends a continuation to the ready queue.
    ///
    /// After shutdown the continuation is dropped instead.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) {
        let mut queues = self.queues.lock().unwrap();

        if queues.shutdown {
            drop(queues);
            drop(task);
            return;
        }

        queues.ready.push_back(task);
        self.condvar.notify_one();
    }

    /// Parks `waker` in the delayed queue until `deadline`.
    pub(crate) fn add_timer(&self, deadline: Instant, waker: Waker, cancelled: Arc<AtomicBool>) {
        let mut queues = self.queues.lock().unwrap();

        if queues.shutdown {
            return;
        }

        let seq = queues.timer_seq;
        queues.timer_seq += 1;
        queues.timers.push(TimerEntry {
            deadline,
            seq,
            waker,
            cancelled,
        });

        // A sleeping thread may be waiting on a later deadline.
        self.condvar.notify_all();
    }

    /// Removes every timer due at `now` and returns their wakers in
    /// `(deadline, enqueue order)` order. Cancelled timers are discarded.
    pub(crate) fn take_due_timers(&self, now: Instant) -> Vec<Waker> {
        let mut queues = self.queues.lock().unwrap();
        let mut due = Vec::new();

        while queues.timers.peek().is_some_and(|entry| entry.deadline <= now) {
            match queues.timers.pop() {
                Some(entry) if !entry.is_cancelled() => due.push(entry.waker),
                _ => {}
            }
        }

        due
    }

    /// Pops the next ready continuation, unless `done` holds.
    ///
    /// When none is ready, blocks until new work is pushed, the earliest
    /// timer is due, or another thread signals.
    pub(crate) fn next(&self, done: &dyn Fn() -> bool) -> Step {
        let mut queues = self.queues.lock().unwrap();

        if queues.shutdown || done() {
            return Step::Exit;
        }

        if let Some(task) = queues.ready.pop_front() {
            return Step::Run(task);
        }

        while queues.timers.peek().is_some_and(TimerEntry::is_cancelled) {
            queues.timers.pop();
        }

        match queues.timers.peek().map(|entry| entry.deadline) {
            Some(deadline) => {
                let now = Instant::now();

                if deadline > now {
                    drop(self.condvar.wait_timeout(queues, deadline - now).unwrap());
                }
            }
            None => {
                drop(self.condvar.wait(queues).unwrap());
            }
        }

        Step::Tick
    }

    /// Stops every loop and drops all queued continuations.
    pub(crate) fn shutdown(&self) {
        let (ready, timers) = {
            let mut queues = self.queues.lock().unwrap();
            queues.shutdown = true;
            self.condvar.notify_all();

            (
                std::mem::take(&mut queues.ready),
                std::mem::take(&mut queues.timers),
            )
        };

        tracing::debug!(
            ready = ready.len(),
            timers = timers.len(),
            "scheduler shut down"
        );
    }
}
