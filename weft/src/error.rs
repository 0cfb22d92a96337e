//! Error types used by the weft runtime.
//!
//! Three groups of errors:
//!
//! - [`Cause`] — why a task terminated without completing (cancellation or
//!   failure). It is recorded once per task and handed to completion callbacks.
//! - [`Error`] — what awaiting a task, a scope, a timeout or a mutex can
//!   return to the caller.
//! - [`SendError`], [`TrySendError`], [`RecvError`], [`TryRecvError`] —
//!   channel and broadcast operations. These stay local to the operation and
//!   never propagate along the task tree.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Terminal outcome of a task, as seen by completion callbacks.
///
/// `Ok(())` means the task and all of its children completed normally.
pub type Outcome = Result<(), Cause>;

/// An unhandled failure raised by a task body.
///
/// Failures come from a panic escaping the body, or from an `Err` returned
/// by a body spawned with [`spawn_try`](crate::task::spawn_try).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Failure {
    message: Arc<str>,
}

impl Failure {
    /// Creates a failure carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Arc::from(message.into()),
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Builds a failure from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked".to_string()
        };

        Self::new(message)
    }
}

/// Why a task stopped without completing.
///
/// The cause is recorded the first time a task is cancelled or fails and
/// never changes afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Cooperative cancellation. Not an application error.
    #[error("cancelled: {0}")]
    Cancelled(Arc<str>),

    /// An unhandled failure, either of the task itself or propagated from a
    /// non-supervised child.
    #[error("failed: {0}")]
    Failed(Failure),
}

impl Cause {
    /// Creates a cancellation cause with the given reason.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Cause::Cancelled(Arc::from(reason.into()))
    }

    /// Returns `true` if the cause is a failure rather than a cancellation.
    pub fn is_failure(&self) -> bool {
        matches!(self, Cause::Failed(_))
    }
}

/// Errors returned when awaiting tasks, scopes, timeouts and locks.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The task or scope was cancelled before it could complete.
    #[error("task was cancelled: {0}")]
    Cancelled(Arc<str>),

    /// The task or scope failed.
    #[error("task failed: {0}")]
    Failed(Failure),

    /// A caller-imposed deadline elapsed first.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The current task tried to lock a mutex it already holds.
    #[error("mutex is already held by the current task")]
    ReentrantLock,
}

impl Error {
    /// Returns `true` for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Returns `true` for [`Error::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Error::Failed(_))
    }

    /// Returns `true` for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<Cause> for Error {
    fn from(cause: Cause) -> Self {
        match cause {
            Cause::Cancelled(reason) => Error::Cancelled(reason),
            Cause::Failed(failure) => Error::Failed(failure),
        }
    }
}

fn closed_suffix(cause: &Option<Arc<str>>) -> String {
    match cause {
        Some(cause) => format!(": {cause}"),
        None => String::new(),
    }
}

/// The channel was closed and holds no more values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("channel is closed{}", closed_suffix(.cause))]
pub struct RecvError {
    /// Cause passed to [`Channel::close_with`](crate::channel::Channel::close_with), if any.
    pub cause: Option<Arc<str>>,
}

/// Failure of a non-suspending receive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing is available right now.
    #[error("channel is empty")]
    Empty,

    /// The channel is closed and drained.
    #[error(transparent)]
    Closed(#[from] RecvError),
}

/// A send on a closed channel. The rejected value is handed back.
pub struct SendError<T> {
    /// The value that could not be sent.
    pub value: T,

    /// Close cause of the channel, if any.
    pub cause: Option<Arc<str>>,
}

impl<T> SendError<T> {
    /// Consumes the error, returning the value that was not sent.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError")
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sending on a closed channel{}", closed_suffix(&self.cause))
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Failure of a non-suspending send. The rejected value is handed back.
pub enum TrySendError<T> {
    /// Accepting the value would require suspending.
    Full(T),

    /// The channel is closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Consumes the error, returning the value that was not sent.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(value) | TrySendError::Closed(value) => value,
        }
    }

    /// Returns `true` if the send failed because the channel was full.
    pub fn is_full(&self) -> bool {
        matches!(self, TrySendError::Full(_))
    }

    /// Returns `true` if the send failed because the channel was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, TrySendError::Closed(_))
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("channel is full"),
            TrySendError::Closed(_) => f.write_str("channel is closed"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let failure = Failure::from_panic(Box::new("boom"));
        assert_eq!(failure.message(), "boom");

        let failure = Failure::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(failure.message(), "owned boom");

        let failure = Failure::from_panic(Box::new(7_u32));
        assert_eq!(failure.message(), "task panicked");
    }

    #[test]
    fn cause_converts_into_error() {
        let err: Error = Cause::cancelled("stop").into();
        assert!(err.is_cancelled());

        let err: Error = Cause::Failed(Failure::new("bad")).into();
        assert_eq!(err, Error::Failed(Failure::new("bad")));
        assert_eq!(err.to_string(), "task failed: bad");
    }

    #[test]
    fn closed_errors_mention_cause() {
        let plain = RecvError { cause: None };
        assert_eq!(plain.to_string(), "channel is closed");

        let with_cause = RecvError {
            cause: Some(Arc::from("producer failed")),
        };
        assert_eq!(with_cause.to_string(), "channel is closed: producer failed");
    }
}
