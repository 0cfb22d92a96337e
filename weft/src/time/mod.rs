//! Single-shot delays and timeouts.
//!
//! - [`sleep`] parks the current task in the scheduler's delayed queue;
//! - [`timeout`] races a future, run in its own scope, against a sleep.

mod sleep;
mod timeout;

#[doc(inline)]
pub use sleep::{Sleep, sleep};

#[doc(inline)]
pub use timeout::{Timeout, timeout};
