use super::{Scheduler, Step};
use crate::runtime::context::enter_scheduler;

use std::sync::Arc;
use std::time::Instant;

/// A thread driving the scheduler.
///
/// Each iteration of the loop:
/// 1. moves every delayed continuation whose deadline has elapsed into the
///    ready queue;
/// 2. runs one ready continuation;
/// 3. parks until the next deadline or new work when nothing is ready.
pub(crate) struct Worker {
    scheduler: Arc<Scheduler>,
}

impl Worker {
    pub(crate) fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Runs the loop until `done` holds or the scheduler shuts down.
    ///
    /// `done` is evaluated under the scheduler lock and must not block.
    pub(crate) fn run_until(&self, done: impl Fn() -> bool) {
        enter_scheduler(self.scheduler.clone(), || {
            loop {
                for waker in self.scheduler.take_due_timers(Instant::now()) {
                    waker.wake();
                }

                match self.scheduler.next(&done) {
                    Step::Run(task) => task.run(),
                    Step::Tick => {}
                    Step::Exit => break,
                }
            }
        });
    }
}
