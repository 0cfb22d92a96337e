//! Hot multi-subscriber streams with replay.
//!
//! A [`BroadcastStream`] pushes every published value to each current
//! subscriber, whether or not anyone is subscribed. Each subscriber owns a
//! private [`Channel`], so a slow subscriber only applies its own overflow
//! policy and never holds back the others, except for `Suspend`
//! subscribers, which make the publisher wait until they have room.
//!
//! A [`StateStream`] is a broadcast stream that always holds a current
//! value: subscribers start from it and only see changes.

use crate::channel::{Capacity, Channel, Overflow, RecvFuture};
use crate::error::{SendError, TryRecvError, TrySendError};

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Queue size of a subscriber created with [`BroadcastStream::subscribe`],
/// when the replay buffer is smaller.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// A hot stream delivering each published value to every subscriber.
///
/// The last `replay` values are kept and delivered first to every new
/// subscriber, oldest first.
///
/// # Examples
///
/// ```rust,ignore
/// let prices = BroadcastStream::new(1);
/// prices.publish(10).await?;
///
/// let sub = prices.subscribe();
/// assert_eq!(sub.receive().await?, 10);
/// ```
pub struct BroadcastStream<T> {
    shared: Arc<Mutex<Shared<T>>>,

    /// Holds a single token; a publisher delivers only while holding it.
    gate: Channel<()>,
}

/// The publishing token, handed back to the gate on drop.
struct Turn<'a> {
    gate: &'a Channel<()>,
}

impl<'a> Turn<'a> {
    async fn acquire(gate: &'a Channel<()>) -> Turn<'a> {
        // The gate is never closed while a stream handle exists.
        let _ = gate.receive().await;
        Turn { gate }
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let _ = self.gate.try_send(());
    }
}

fn new_gate() -> Channel<()> {
    let gate = Channel::bounded(1);
    let _ = gate.try_send(());
    gate
}

struct Shared<T> {
    replay: VecDeque<T>,
    replay_capacity: usize,
    subscribers: Vec<Sink<T>>,
    next_id: u64,
    closed: bool,
}

struct Sink<T> {
    id: u64,
    channel: Channel<T>,
}

impl<T> Shared<T> {
    fn remove(&mut self, id: u64) -> Option<Channel<T>> {
        let index = self.subscribers.iter().position(|sink| sink.id == id)?;
        Some(self.subscribers.swap_remove(index).channel)
    }
}

impl<T: Clone> BroadcastStream<T> {
    /// Creates a stream replaying its last `replay` values to new
    /// subscribers. `replay` may be zero.
    pub fn new(replay: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                replay: VecDeque::with_capacity(replay),
                replay_capacity: replay,
                subscribers: Vec::new(),
                next_id: 0,
                closed: false,
            })),
            gate: new_gate(),
        }
    }

    /// Subscribes with a bounded queue of [`DEFAULT_SUBSCRIBER_CAPACITY`]
    /// values and the `Suspend` policy.
    pub fn subscribe(&self) -> Subscription<T> {
        self.subscribe_with(
            Capacity::Bounded(DEFAULT_SUBSCRIBER_CAPACITY),
            Overflow::Suspend,
        )
    }

    /// Subscribes with the given queue capacity and overflow policy.
    ///
    /// The queue is pre-loaded with the replay buffer; a bounded capacity
    /// smaller than the replay size is raised to it. Subscribing to a closed
    /// stream yields the replay, then the end of the stream.
    pub fn subscribe_with(&self, capacity: Capacity, overflow: Overflow) -> Subscription<T> {
        let mut shared = self.shared.lock().unwrap();

        let capacity = match capacity {
            Capacity::Bounded(n) => Capacity::Bounded(n.max(shared.replay_capacity)),
            Capacity::Unbounded => Capacity::Unbounded,
        };

        let channel = Channel::new(capacity, overflow);

        for value in &shared.replay {
            if let Err(err) = channel.try_send(value.clone()) {
                tracing::debug!(error = %err, "replay value not delivered");
            }
        }

        let id = shared.next_id;
        shared.next_id += 1;

        if shared.closed {
            channel.close();
        } else {
            shared.subscribers.push(Sink {
                id,
                channel: channel.clone(),
            });
        }

        tracing::trace!(subscriber = id, replayed = shared.replay.len(), "subscribed");

        Subscription {
            id,
            channel,
            stream: Arc::downgrade(&self.shared),
        }
    }

    /// Publishes `value` to every current subscriber.
    ///
    /// Subscribers using a drop policy never make the publisher wait. A full
    /// `Suspend` subscriber suspends the publisher until it has room; the
    /// remaining subscribers are served afterwards, in subscription order.
    ///
    /// Concurrent publishers are served one at a time, in arrival order, so
    /// every subscriber sees the values in the same order.
    ///
    /// # Errors
    ///
    /// Returns the value if the stream is closed.
    pub async fn publish(&self, value: T) -> Result<(), SendError<T>> {
        let _turn = Turn::acquire(&self.gate).await;
        self.deliver(value).await
    }

    /// Delivers `value`; the caller holds the publishing turn.
    async fn deliver(&self, value: T) -> Result<(), SendError<T>> {
        let sinks: Vec<(u64, Channel<T>)> = {
            let mut shared = self.shared.lock().unwrap();

            if shared.closed {
                return Err(SendError { value, cause: None });
            }

            if shared.replay_capacity > 0 {
                if shared.replay.len() == shared.replay_capacity {
                    shared.replay.pop_front();
                }
                shared.replay.push_back(value.clone());
            }

            shared
                .subscribers
                .iter()
                .map(|sink| (sink.id, sink.channel.clone()))
                .collect()
        };

        for (id, channel) in sinks {
            match channel.try_send(value.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(pending)) => {
                    if channel.send(pending).await.is_err() {
                        self.remove(id);
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    self.remove(id);
                }
            }
        }

        Ok(())
    }

    /// Removes `subscription`; it receives no further values. Returns `false`
    /// if it was not subscribed anymore.
    pub fn unsubscribe(&self, subscription: &Subscription<T>) -> bool {
        self.remove(subscription.id)
    }

    /// Snapshot of the replay buffer, oldest first.
    pub fn replay_cache(&self) -> Vec<T> {
        self.shared.lock().unwrap().replay.iter().cloned().collect()
    }
}

impl<T> BroadcastStream<T> {
    fn remove(&self, id: u64) -> bool {
        let removed = self.shared.lock().unwrap().remove(id);

        match removed {
            Some(channel) => {
                channel.close();
                tracing::trace!(subscriber = id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().unwrap().subscribers.len()
    }

    /// Ends the stream. Subscribers drain what they already received, then
    /// see the channel closed. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let sinks = {
            let mut shared = self.shared.lock().unwrap();

            if shared.closed {
                return false;
            }

            shared.closed = true;
            std::mem::take(&mut shared.subscribers)
        };

        tracing::debug!(subscribers = sinks.len(), "broadcast stream closed");

        for sink in sinks {
            sink.channel.close();
        }

        true
    }
}

impl<T> Clone for BroadcastStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<T> fmt::Debug for BroadcastStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock().unwrap();

        f.debug_struct("BroadcastStream")
            .field("replay", &shared.replay.len())
            .field("subscribers", &shared.subscribers.len())
            .field("closed", &shared.closed)
            .finish()
    }
}

/// A subscriber of a [`BroadcastStream`].
///
/// Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    channel: Channel<T>,
    stream: Weak<Mutex<Shared<T>>>,
}

impl<T> Subscription<T> {
    /// Receives the next value, suspending while none is queued.
    ///
    /// Fails once the subscriber was removed or the stream closed, and every
    /// value queued before that was received.
    pub fn receive(&self) -> RecvFuture<'_, T> {
        self.channel.receive()
    }

    pub fn try_receive(&self) -> Result<T, TryRecvError> {
        self.channel.try_receive()
    }

    /// Number of values queued for this subscriber.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Stops receiving. Values already queued can no longer be received.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.stream.upgrade() {
            shared.lock().unwrap().remove(self.id);
        }

        self.channel.close();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("queued", &self.len())
            .finish()
    }
}

/// A hot stream holding a current value.
///
/// Setting a value equal to the current one does nothing. Subscribers get
/// the current value first, then every change; a subscriber that falls
/// behind only keeps the latest value, so setting never waits on slow
/// subscribers.
///
/// # Examples
///
/// ```rust,ignore
/// let status = StateStream::new("starting");
/// let sub = status.subscribe();
///
/// status.set("ready").await;
/// assert_eq!(sub.receive().await?, "ready");
/// assert_eq!(status.value(), "ready");
/// ```
pub struct StateStream<T> {
    stream: BroadcastStream<T>,
    current: Arc<Mutex<T>>,
}

impl<T: Clone + PartialEq> StateStream<T> {
    pub fn new(initial: T) -> Self {
        let stream = BroadcastStream::new(1);
        stream.shared.lock().unwrap().replay.push_back(initial.clone());

        Self {
            stream,
            current: Arc::new(Mutex::new(initial)),
        }
    }

    /// Returns a copy of the current value.
    pub fn value(&self) -> T {
        self.current.lock().unwrap().clone()
    }

    /// Replaces the current value. Returns `false`, publishing nothing, if
    /// `value` equals the current one.
    pub async fn set(&self, value: T) -> bool {
        self.update(|_| value).await
    }

    /// Replaces the current value with `f(current)`, atomically with respect
    /// to other updates. Returns `false` if the value did not change.
    pub async fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let _turn = Turn::acquire(&self.stream.gate).await;

        let value = {
            let mut current = self.current.lock().unwrap();
            let next = f(&current);

            if next == *current {
                return false;
            }

            *current = next.clone();
            next
        };

        // Only `DropOldest` subscribers and never closed: delivery cannot
        // suspend or fail.
        let _ = self.stream.deliver(value).await;
        tracing::trace!("state changed");
        true
    }

    /// Subscribes, receiving the current value first.
    pub fn subscribe(&self) -> Subscription<T> {
        self.stream
            .subscribe_with(Capacity::Bounded(1), Overflow::DropOldest)
    }

    pub fn subscriber_count(&self) -> usize {
        self.stream.subscriber_count()
    }
}

impl<T> Clone for StateStream<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            current: self.current.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StateStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStream")
            .field("value", &*self.current.lock().unwrap())
            .field("subscribers", &self.stream.subscriber_count())
            .finish()
    }
}
