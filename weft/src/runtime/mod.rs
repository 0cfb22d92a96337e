//! The runtime: scheduler, task continuations and the threads driving them.
//!
//! A [`Runtime`] owns one scheduler. The thread calling
//! [`Runtime::block_on`] drives it; with more than one worker thread
//! configured, a pool of helper threads drives it as well.

mod builder;
mod core;

pub(crate) mod context;
pub(crate) mod scheduler;

pub mod task;

pub use builder::RuntimeBuilder;
pub use core::Runtime;
pub use scheduler::FailureReport;
