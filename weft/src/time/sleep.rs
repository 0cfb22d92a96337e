use crate::runtime::context::current_scheduler;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Creates a future that completes after `duration`.
///
/// The deadline is fixed when `sleep` is called. Tasks sleeping until the
/// same deadline resume in the order they started sleeping.
///
/// # Panics
///
/// Panics if polled outside of a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
        registered: None,
        cancelled: Arc::new(AtomicBool::new(false)),
    }
}

/// Future returned by [`sleep`].
///
/// Dropping it before the deadline removes its entry from the delayed
/// queue, which is what happens when a sleeping task is cancelled.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    deadline: Instant,

    /// Waker handed to the scheduler, if any.
    registered: Option<Waker>,

    /// Shared with the delayed queue entry.
    cancelled: Arc<AtomicBool>,
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if Instant::now() >= this.deadline {
            return Poll::Ready(());
        }

        let stale = match &this.registered {
            Some(waker) => !waker.will_wake(cx.waker()),
            None => true,
        };

        if stale {
            let scheduler = current_scheduler().expect("Sleep polled outside of runtime");

            // An entry registered with an outdated waker only causes a
            // spurious wake-up.
            scheduler.add_timer(this.deadline, cx.waker().clone(), this.cancelled.clone());
            this.registered = Some(cx.waker().clone());
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
