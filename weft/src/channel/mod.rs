//! Channels between tasks.
//!
//! A [`Channel`] is a FIFO queue shared by any number of senders and
//! receivers. Its [`Capacity`] and [`Overflow`] policy decide what a send
//! does when nobody is ready to take the value:
//!
//! | capacity        | overflow     | send when full                     |
//! |-----------------|--------------|------------------------------------|
//! | `Bounded(0)`    | `Suspend`    | waits for a receiver (rendezvous)  |
//! | `Bounded(n)`    | `Suspend`    | waits for room                     |
//! | `Bounded(n)`    | `DropOldest` | evicts the oldest buffered value   |
//! | `Bounded(n)`    | `DropLatest` | discards the value being sent      |
//! | `Unbounded`     | -            | never full                         |
//!
//! Suspended senders and receivers are served in arrival order.

mod actor;
mod future;
mod produce;
mod state;

pub use actor::actor;
pub use future::{RecvFuture, SendFuture};
pub use produce::produce;

use crate::error::{RecvError, TryRecvError, TrySendError};
use state::{Offer, State, Take};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Buffer size of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capacity {
    /// At most `n` buffered values. `Bounded(0)` is a rendezvous channel.
    Bounded(usize),

    /// No limit.
    Unbounded,
}

impl Capacity {
    pub const RENDEZVOUS: Capacity = Capacity::Bounded(0);
}

/// What a send does on a full bounded channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Overflow {
    /// Suspend the sender until there is room.
    #[default]
    Suspend,

    /// Evict the oldest buffered value to make room.
    DropOldest,

    /// Discard the value being sent, reporting success.
    DropLatest,
}

/// A multi-producer, multi-consumer channel.
///
/// Cloning a `Channel` yields another handle to the same queue. The channel
/// stays open until [`close`](Self::close) is called, regardless of how many
/// handles exist.
///
/// # Examples
///
/// ```rust,ignore
/// let channel = Channel::bounded(8);
/// let producer = channel.clone();
///
/// task::spawn(async move {
///     for i in 0..3 {
///         producer.send(i).await.unwrap();
///     }
///     producer.close();
/// });
///
/// while let Ok(value) = channel.receive().await {
///     println!("{value}");
/// }
/// ```
pub struct Channel<T> {
    shared: Arc<Mutex<State<T>>>,
}

impl<T> Channel<T> {
    /// Creates a channel with the given capacity and overflow policy.
    ///
    /// A rendezvous capacity combined with a drop policy behaves as
    /// `Bounded(1)`: such a send must never suspend, so it needs a slot.
    pub fn new(capacity: Capacity, overflow: Overflow) -> Self {
        let capacity = match (capacity, overflow) {
            (Capacity::Bounded(0), Overflow::DropOldest | Overflow::DropLatest) => {
                Capacity::Bounded(1)
            }
            _ => capacity,
        };

        Self {
            shared: Arc::new(Mutex::new(State::new(capacity, overflow))),
        }
    }

    /// A channel without buffer: each send waits for a matching receive.
    pub fn rendezvous() -> Self {
        Self::new(Capacity::RENDEZVOUS, Overflow::Suspend)
    }

    /// A channel buffering up to `capacity` values; senders suspend beyond.
    pub fn bounded(capacity: usize) -> Self {
        Self::new(Capacity::Bounded(capacity), Overflow::Suspend)
    }

    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded, Overflow::Suspend)
    }

    /// A channel keeping only the most recent value. Sends never suspend.
    pub fn conflated() -> Self {
        Self::new(Capacity::Bounded(1), Overflow::DropOldest)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared.lock().unwrap()
    }

    /// Sends `value`, suspending while the channel is full.
    ///
    /// Resolves to `Err` with the value handed back if the channel is or
    /// becomes closed before the value is accepted.
    pub fn send(&self, value: T) -> SendFuture<'_, T> {
        SendFuture::new(self, value)
    }

    /// Receives the next value, suspending while the channel is empty.
    ///
    /// After [`close`](Self::close), buffered values are still delivered;
    /// `Err` is returned once none are left.
    pub fn receive(&self) -> RecvFuture<'_, T> {
        RecvFuture::new(self)
    }

    /// Sends without suspending.
    ///
    /// # Errors
    ///
    /// - [`TrySendError::Full`] if the value would have to wait;
    /// - [`TrySendError::Closed`] if the channel is closed.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let offer = self.lock().offer(value);

        match offer {
            Offer::Accepted(waker) => {
                if let Some(waker) = waker {
                    waker.wake();
                }
                Ok(())
            }
            Offer::Full(value) => Err(TrySendError::Full(value)),
            Offer::Closed(value) => Err(TrySendError::Closed(value)),
        }
    }

    /// Receives without suspending.
    ///
    /// # Errors
    ///
    /// - [`TryRecvError::Empty`] if nothing is available yet;
    /// - [`TryRecvError::Closed`] if the channel is closed and drained.
    pub fn try_receive(&self) -> Result<T, TryRecvError> {
        let (take, cause) = {
            let mut state = self.lock();
            (state.take(), state.cause())
        };

        match take {
            Take::Value(value, waker) => {
                if let Some(waker) = waker {
                    waker.wake();
                }
                Ok(value)
            }
            Take::Empty => Err(TryRecvError::Empty),
            Take::Closed => Err(TryRecvError::Closed(RecvError { cause })),
        }
    }

    /// Closes the channel.
    ///
    /// Pending and future sends fail. Receivers drain what is buffered, then
    /// fail. Returns `false` if the channel was already closed.
    pub fn close(&self) -> bool {
        self.close_inner(None)
    }

    /// Closes the channel, recording `cause` in the errors seen by senders
    /// and receivers.
    pub fn close_with(&self, cause: impl Into<String>) -> bool {
        self.close_inner(Some(Arc::from(cause.into())))
    }

    fn close_inner(&self, cause: Option<Arc<str>>) -> bool {
        let Some(wakers) = self.lock().close(cause) else {
            return false;
        };

        tracing::debug!(woken = wakers.len(), "channel closed");

        for waker in wakers {
            waker.wake();
        }

        true
    }

    /// Returns `true` once the channel is closed; sends fail from then on.
    pub fn is_closed_for_send(&self) -> bool {
        self.lock().is_closed()
    }

    /// Returns `true` once the channel is closed and drained; receives fail
    /// from then on.
    pub fn is_closed_for_receive(&self) -> bool {
        self.lock().is_drained()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Capacity {
        self.lock().capacity()
    }

    pub fn overflow(&self) -> Overflow {
        self.lock().overflow()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();

        f.debug_struct("Channel")
            .field("capacity", &state.capacity())
            .field("overflow", &state.overflow())
            .field("len", &state.len())
            .field("closed", &state.is_closed())
            .finish()
    }
}
