use crate::job::{Job, JobKind};
use crate::runtime::context::current_job;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Runs `future` in a region that cancellation cannot interrupt.
///
/// A task cancelled while inside the region keeps running until `future`
/// returns; the cancellation takes effect at the first suspension point
/// after the region. Typical use is cleanup that must itself suspend, such
/// as flushing into a channel.
///
/// Outside of a runtime the future is simply polled.
pub fn non_cancellable<F: Future>(future: F) -> NonCancellable<F> {
    NonCancellable {
        future: Box::pin(future),
        shielded: None,
    }
}

/// Future returned by [`non_cancellable`].
pub struct NonCancellable<F> {
    future: Pin<Box<F>>,

    /// Jobs shielded by this region, from the innermost scope up to the
    /// task polling it. `None` until first poll.
    shielded: Option<Vec<Arc<Job>>>,
}

impl<F> NonCancellable<F> {
    fn enter(&mut self) {
        if self.shielded.is_some() {
            return;
        }

        let mut jobs = Vec::new();
        let mut next = current_job();

        while let Some(job) = next {
            job.shield();
            next = match job.kind() {
                JobKind::Scope => job.parent(),
                JobKind::Task => None,
            };
            jobs.push(job);
        }

        self.shielded = Some(jobs);
    }

    fn exit(&mut self) {
        for job in self.shielded.iter_mut().flat_map(|jobs| jobs.drain(..)) {
            job.unshield();
        }
    }
}

impl<F: Future> Future for NonCancellable<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = self.get_mut();
        this.enter();

        let output = std::task::ready!(this.future.as_mut().poll(cx));
        this.exit();

        Poll::Ready(output)
    }
}

impl<F> Drop for NonCancellable<F> {
    fn drop(&mut self) {
        self.exit();
    }
}
