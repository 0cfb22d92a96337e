//! Synchronization primitives for tasks.
//!
//! A `std::sync::Mutex` must never be held across a suspension point. State
//! that has to stay locked while a task suspends goes behind a [`Mutex`]
//! from this module instead.

mod mutex;

pub use mutex::{LockFuture, Mutex, MutexGuard};
