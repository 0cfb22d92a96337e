//! Poll states of a [`Task`](super::Task).
//!
//! These only track who may poll the body. The lifecycle of the task as seen
//! by users lives in its [`Job`](crate::job::Job).

/// Not queued and not running; waiting for a wake-up.
pub(crate) const IDLE: usize = 0;

/// Sitting in the ready queue.
pub(crate) const QUEUED: usize = 1;

/// Being polled by exactly one thread.
pub(crate) const RUNNING: usize = 2;

/// Woken while running; re-queued as soon as the current poll returns.
pub(crate) const NOTIFIED: usize = 3;

/// The body returned, failed or was abandoned. It is never polled again.
pub(crate) const DONE: usize = 4;
