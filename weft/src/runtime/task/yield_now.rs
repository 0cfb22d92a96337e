use std::pin::Pin;
use std::task::{Context, Poll};

/// Suspends the current task once, letting every other ready task run
/// before it resumes.
///
/// This is also a cancellation point: a task cancelled while yielding does
/// not resume.
///
/// # Examples
///
/// ```rust,ignore
/// for chunk in work {
///     process(chunk);
///     weft::task::yield_now().await;
/// }
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }

        // Re-enqueued at the back of the ready queue.
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
