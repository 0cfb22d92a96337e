//! # Weft
//!
//! **Weft** is a small structured-concurrency runtime.
//!
//! Every task belongs to the task that spawned it. A task is only finished
//! once all of its children are, cancelling a task cancels everything below
//! it, and a failing task takes its siblings and its parent down with it
//! unless the parent is a supervisor.
//!
//! On top of the task tree the runtime provides:
//!
//! - **Channels** with rendezvous, bounded and unbounded capacities and a
//!   choice of overflow policy
//! - **Broadcast streams** delivering every value to each subscriber, with
//!   a replay buffer for late subscribers, and **state streams** holding a
//!   current value
//! - **Cold flows** re-running their producer for each collector
//! - **Delays and timeouts** driven by the scheduler's delayed queue
//! - A **cooperative mutex** and **non-cancellable regions** for cleanup
//! - **Attribute macros** `#[weft::main]` and `#[weft::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use weft::channel::Channel;
//! use weft::task;
//! use weft::time::sleep;
//!
//! #[weft::main]
//! async fn main() {
//!     let channel = Channel::rendezvous();
//!     let tx = channel.clone();
//!
//!     task::spawn(async move {
//!         sleep(Duration::from_millis(10)).await;
//!         tx.send("hello").await.unwrap();
//!     });
//!
//!     println!("{}", channel.receive().await.unwrap());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`task`] — Spawning, scopes, cancellation and supervision
//! - [`channel`] — Channels between tasks
//! - [`broadcast`] — Hot streams with replay
//! - [`flow`] — Cold streams and their operators
//! - [`sync`] — Cooperative mutex
//! - [`time`] — Sleep and timeout
//! - [`error`] — Error types

mod job;
mod runtime;

pub mod broadcast;
pub mod channel;
pub mod error;
pub mod flow;
pub mod sync;
pub mod time;

pub use error::{Cause, Error, Failure, Outcome};
pub use job::{JobId, JobState};
pub use runtime::task;
pub use runtime::{FailureReport, Runtime, RuntimeBuilder};

pub use weft_macros::{main, test};
