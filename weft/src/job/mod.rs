//! Task tree bookkeeping.
//!
//! Every spawned task and every inline scope is represented by a [`Job`]:
//! a node holding the lifecycle state, the owned children, the cancellation
//! cause and the completion callbacks. Cancellation and failure propagate
//! only along the edges of this tree:
//!
//! - cancelling a job cancels all of its live descendants, never its parent;
//! - a failing child fails its parent and cancels its siblings, unless the
//!   parent is a supervisor;
//! - a job terminates only once all of its children have terminated.

mod core;
mod state;

pub(crate) use core::Job;
pub use state::JobState;

use std::fmt;

/// Opaque identifier of a task, unique within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// How a job's body is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobKind {
    /// A spawned task polled by the scheduler.
    Task,

    /// A scope body polled inline by its caller. Its failure is returned to
    /// the caller instead of propagating to the parent.
    Scope,
}
