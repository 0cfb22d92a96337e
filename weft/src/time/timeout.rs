use super::sleep::{Sleep, sleep};
use crate::error::{Cause, Error};
use crate::runtime::task::{Scope, scope};

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Runs `future` in its own scope, cancelling the scope if it is still
/// running after `duration`.
///
/// On expiry the scope and every task spawned in it are cancelled, and the
/// timeout resolves once they have all stopped.
///
/// # Errors
///
/// - [`Error::Timeout`] if the deadline elapsed first;
/// - [`Error::Failed`] if `future` or one of its children failed;
/// - [`Error::Cancelled`] if the enclosing task was cancelled.
///
/// # Examples
///
/// ```rust,ignore
/// let result = timeout(Duration::from_millis(50), async {
///     sleep(Duration::from_secs(10)).await;
/// })
/// .await;
///
/// assert!(result.unwrap_err().is_timeout());
/// ```
pub fn timeout<F: Future>(duration: Duration, future: F) -> Timeout<F> {
    Timeout {
        scope: scope(future),
        sleep: sleep(duration),
        duration,
        expired: false,
    }
}

/// Future returned by [`timeout`].
#[must_use = "futures do nothing unless awaited"]
pub struct Timeout<F: Future> {
    scope: Scope<F>,
    sleep: Sleep,
    duration: Duration,
    expired: bool,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            if let Poll::Ready(result) = Pin::new(&mut this.scope).poll(cx) {
                return Poll::Ready(match result {
                    Err(Error::Cancelled(_)) if this.expired => Err(Error::Timeout(this.duration)),
                    other => other,
                });
            }

            if this.expired {
                return Poll::Pending;
            }

            match Pin::new(&mut this.sleep).poll(cx) {
                Poll::Ready(()) => {
                    tracing::debug!(duration = ?this.duration, "timeout elapsed");

                    this.expired = true;
                    this.scope.cancel(Cause::cancelled(format!(
                        "timed out after {:?}",
                        this.duration
                    )));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
