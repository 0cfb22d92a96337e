//! Tasks, scopes and cancellation.
//!
//! A task spawned with [`spawn`] becomes a child of the task (or scope)
//! spawning it. Children never outlive their parent: a parent whose body is
//! done stays `Completing` until every child is terminal.
//!
//! Cancellation flows down the tree and is observed at suspension points.
//! Failures flow up: a failing task cancels its siblings and fails its
//! parent, unless the parent is a supervisor.

mod builder;
mod core;
mod handle;
mod scope;
mod shield;
mod state;
mod waker;
mod yield_now;

pub(crate) use core::{Runnable, Task};

pub use builder::Builder;
pub use handle::{Join, JoinHandle};
pub use scope::{Scope, scope, supervisor_scope};
pub use shield::{NonCancellable, non_cancellable};
pub use yield_now::{YieldNow, yield_now};

use crate::error::{Cause, Error};
use crate::job::{JobId, JobState};
use crate::runtime::context::current_job;

use std::fmt;

/// Spawns `future` as a child of the current task.
///
/// # Panics
///
/// Panics if called outside of a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = weft::task::spawn(async { 21 * 2 });
/// assert_eq!(handle.await.unwrap(), 42);
/// ```
pub fn spawn<F, T>(future: F) -> JoinHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    Builder::new().spawn(future)
}

/// Spawns a fallible `future` as a child of the current task. An `Err`
/// fails the task.
///
/// # Panics
///
/// Panics if called outside of a runtime.
pub fn spawn_try<F, T, E>(future: F) -> JoinHandle<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display,
{
    Builder::new().spawn_try(future)
}

/// Returns `Err` if the current task has been cancelled.
///
/// Always `Ok` inside a [`non_cancellable`] region and outside of a
/// runtime.
pub fn ensure_active() -> Result<(), Error> {
    let Some(job) = current_job() else {
        return Ok(());
    };

    if job.is_shielded() {
        return Ok(());
    }

    match job.cause() {
        Some(Cause::Failed(failure)) => Err(Error::Failed(failure)),
        Some(Cause::Cancelled(reason)) => Err(Error::Cancelled(reason)),
        None => Ok(()),
    }
}

/// Identifier of the current task or scope, if any.
pub fn current_id() -> Option<JobId> {
    current_job().map(|job| job.id())
}

/// State of the current task or scope, if any.
pub fn current_state() -> Option<JobState> {
    current_job().map(|job| job.state())
}
