use super::{Capacity, Overflow};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::task::Waker;

/// A suspended send or receive, in arrival order.
struct Parked<T> {
    ticket: u64,
    waker: Waker,

    /// The value being sent. Always `None` for receivers.
    value: Option<T>,
}

/// How a parked send was resolved by another operation.
pub(super) enum SendDone<T> {
    Sent,
    Closed(T),
}

/// How a parked receive was resolved by another operation.
pub(super) enum RecvDone<T> {
    Received(T),
    Closed,
}

/// Result of a non-suspending send attempt.
pub(super) enum Offer<T> {
    /// Buffered, handed to a receiver, or discarded by the overflow policy.
    /// Carries the waker of the receiver to resume, if any.
    Accepted(Option<Waker>),
    Full(T),
    Closed(T),
}

/// Result of a non-suspending receive attempt.
pub(super) enum Take<T> {
    /// Carries the waker of the sender to resume, if any.
    Value(T, Option<Waker>),
    Empty,
    Closed,
}

/// Buffer and wait queues of a channel.
///
/// Pending receivers only exist while the buffer is empty and no sender is
/// parked; pending senders only exist while the buffer is full. Wakers are
/// returned to the caller and must be woken after the lock is released.
pub(super) struct State<T> {
    capacity: Capacity,
    overflow: Overflow,
    buffer: VecDeque<T>,

    closed: bool,
    cause: Option<Arc<str>>,

    senders: VecDeque<Parked<T>>,
    receivers: VecDeque<Parked<T>>,

    sent: HashMap<u64, SendDone<T>>,
    received: HashMap<u64, RecvDone<T>>,

    next_ticket: u64,
}

impl<T> State<T> {
    pub(super) fn new(capacity: Capacity, overflow: Overflow) -> Self {
        Self {
            capacity,
            overflow,
            buffer: VecDeque::new(),
            closed: false,
            cause: None,
            senders: VecDeque::new(),
            receivers: VecDeque::new(),
            sent: HashMap::new(),
            received: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub(super) fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub(super) fn overflow(&self) -> Overflow {
        self.overflow
    }

    pub(super) fn len(&self) -> usize {
        self.buffer.len()
    }

    pub(super) fn cause(&self) -> Option<Arc<str>> {
        self.cause.clone()
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and nothing left to receive.
    pub(super) fn is_drained(&self) -> bool {
        self.closed && self.buffer.is_empty() && self.senders.is_empty()
    }

    fn has_room(&self) -> bool {
        match self.capacity {
            Capacity::Unbounded => true,
            Capacity::Bounded(n) => self.buffer.len() < n,
        }
    }

    fn ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Sends `value` without suspending.
    ///
    /// A waiting receiver is served first, then the buffer, then the
    /// overflow policy.
    pub(super) fn offer(&mut self, value: T) -> Offer<T> {
        if self.closed {
            return Offer::Closed(value);
        }

        if let Some(receiver) = self.receivers.pop_front() {
            self.received
                .insert(receiver.ticket, RecvDone::Received(value));
            return Offer::Accepted(Some(receiver.waker));
        }

        if self.senders.is_empty() && self.has_room() {
            self.buffer.push_back(value);
            return Offer::Accepted(None);
        }

        match self.overflow {
            Overflow::Suspend => Offer::Full(value),
            Overflow::DropOldest => {
                self.buffer.pop_front();
                self.buffer.push_back(value);
                tracing::trace!("channel full, dropped oldest element");
                Offer::Accepted(None)
            }
            Overflow::DropLatest => {
                drop(value);
                tracing::trace!("channel full, dropped latest element");
                Offer::Accepted(None)
            }
        }
    }

    /// Receives without suspending.
    ///
    /// Taking from a full buffer admits the oldest parked sender's value.
    pub(super) fn take(&mut self) -> Take<T> {
        if let Some(value) = self.buffer.pop_front() {
            let waker = self.senders.pop_front().map(|mut sender| {
                if let Some(pending) = sender.value.take() {
                    self.buffer.push_back(pending);
                }
                self.sent.insert(sender.ticket, SendDone::Sent);
                sender.waker
            });

            return Take::Value(value, waker);
        }

        if let Some(mut sender) = self.senders.pop_front() {
            self.sent.insert(sender.ticket, SendDone::Sent);

            if let Some(value) = sender.value.take() {
                return Take::Value(value, Some(sender.waker));
            }
        }

        if self.closed {
            Take::Closed
        } else {
            Take::Empty
        }
    }

    pub(super) fn park_sender(&mut self, value: T, waker: &Waker) -> u64 {
        let ticket = self.ticket();
        self.senders.push_back(Parked {
            ticket,
            waker: waker.clone(),
            value: Some(value),
        });
        ticket
    }

    pub(super) fn park_receiver(&mut self, waker: &Waker) -> u64 {
        let ticket = self.ticket();
        self.receivers.push_back(Parked {
            ticket,
            waker: waker.clone(),
            value: None,
        });
        ticket
    }

    /// Resolution of a parked send, or `None` while it is still parked.
    /// Refreshes the stored waker in the latter case.
    pub(super) fn poll_sender(&mut self, ticket: u64, waker: &Waker) -> Option<SendDone<T>> {
        if let Some(done) = self.sent.remove(&ticket) {
            return Some(done);
        }

        if let Some(sender) = self.senders.iter_mut().find(|s| s.ticket == ticket) {
            sender.waker.clone_from(waker);
        }

        None
    }

    /// Resolution of a parked receive, or `None` while it is still parked.
    pub(super) fn poll_receiver(&mut self, ticket: u64, waker: &Waker) -> Option<RecvDone<T>> {
        if let Some(done) = self.received.remove(&ticket) {
            return Some(done);
        }

        if let Some(receiver) = self.receivers.iter_mut().find(|r| r.ticket == ticket) {
            receiver.waker.clone_from(waker);
        }

        None
    }

    /// Withdraws a send whose future was dropped. Returns the value that was
    /// never delivered, if any.
    pub(super) fn cancel_sender(&mut self, ticket: u64) -> Option<T> {
        if let Some(index) = self.senders.iter().position(|s| s.ticket == ticket) {
            return self.senders.remove(index).and_then(|sender| sender.value);
        }

        match self.sent.remove(&ticket) {
            Some(SendDone::Closed(value)) => Some(value),
            _ => None,
        }
    }

    /// Withdraws a receive whose future was dropped.
    ///
    /// A value already handed to it goes to the next parked receiver, or
    /// back to the head of the buffer if there is room. Returns the waker of
    /// the receiver to resume.
    pub(super) fn cancel_receiver(&mut self, ticket: u64) -> Option<Waker> {
        if let Some(index) = self.receivers.iter().position(|r| r.ticket == ticket) {
            self.receivers.remove(index);
            return None;
        }

        let Some(RecvDone::Received(value)) = self.received.remove(&ticket) else {
            return None;
        };

        if let Some(receiver) = self.receivers.pop_front() {
            self.received
                .insert(receiver.ticket, RecvDone::Received(value));
            return Some(receiver.waker);
        }

        if self.has_room() {
            self.buffer.push_front(value);
        } else {
            tracing::debug!("dropping element of a cancelled receive");
        }

        None
    }

    /// Closes the channel. Parked senders fail; parked receivers fail too,
    /// since they only exist while nothing is buffered.
    ///
    /// Returns the wakers to resume, or `None` if already closed.
    pub(super) fn close(&mut self, cause: Option<Arc<str>>) -> Option<Vec<Waker>> {
        if self.closed {
            return None;
        }

        self.closed = true;
        self.cause = cause;

        let mut wakers = Vec::with_capacity(self.senders.len() + self.receivers.len());

        for mut sender in self.senders.drain(..) {
            if let Some(value) = sender.value.take() {
                self.sent.insert(sender.ticket, SendDone::Closed(value));
            }
            wakers.push(sender.waker);
        }

        for receiver in self.receivers.drain(..) {
            self.received.insert(receiver.ticket, RecvDone::Closed);
            wakers.push(receiver.waker);
        }

        Some(wakers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::task::Waker;

    fn noop() -> &'static Waker {
        Waker::noop()
    }

    fn drain<T>(state: &mut State<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Take::Value(value, _) = state.take() {
            out.push(value);
        }
        out
    }

    #[test]
    fn rendezvous_never_buffers() {
        let mut state = State::new(Capacity::Bounded(0), Overflow::Suspend);

        assert!(matches!(state.offer(1), Offer::Full(1)));
        assert_eq!(state.len(), 0);

        let ticket = state.park_sender(1, noop());
        assert!(matches!(state.take(), Take::Value(1, Some(_))));
        assert!(matches!(state.poll_sender(ticket, noop()), Some(SendDone::Sent)));
    }

    #[test]
    fn parked_receiver_gets_value_directly() {
        let mut state = State::new(Capacity::Bounded(0), Overflow::Suspend);
        let ticket = state.park_receiver(noop());

        assert!(matches!(state.offer(7), Offer::Accepted(Some(_))));
        assert!(matches!(
            state.poll_receiver(ticket, noop()),
            Some(RecvDone::Received(7))
        ));
    }

    #[test]
    fn full_buffer_admits_parked_sender_on_take() {
        let mut state = State::new(Capacity::Bounded(1), Overflow::Suspend);

        assert!(matches!(state.offer(1), Offer::Accepted(None)));
        let ticket = state.park_sender(2, noop());

        assert!(matches!(state.take(), Take::Value(1, Some(_))));
        assert!(matches!(state.poll_sender(ticket, noop()), Some(SendDone::Sent)));
        assert_eq!(drain(&mut state), vec![2]);
    }

    #[test]
    fn drop_policies_never_report_full() {
        let mut oldest = State::new(Capacity::Bounded(2), Overflow::DropOldest);
        let mut latest = State::new(Capacity::Bounded(2), Overflow::DropLatest);

        for value in 1..=5 {
            assert!(matches!(oldest.offer(value), Offer::Accepted(_)));
            assert!(matches!(latest.offer(value), Offer::Accepted(_)));
        }

        assert_eq!(drain(&mut oldest), vec![4, 5]);
        assert_eq!(drain(&mut latest), vec![1, 2]);
    }

    #[test]
    fn close_fails_parked_senders_and_keeps_buffer() {
        let mut state = State::new(Capacity::Bounded(1), Overflow::Suspend);

        assert!(matches!(state.offer(1), Offer::Accepted(None)));
        let ticket = state.park_sender(2, noop());

        let wakers = state.close(Some(Arc::from("done")));
        assert_eq!(wakers.map(|w| w.len()), Some(1));
        assert!(state.close(None).is_none());

        assert!(matches!(
            state.poll_sender(ticket, noop()),
            Some(SendDone::Closed(2))
        ));
        assert!(matches!(state.take(), Take::Value(1, None)));
        assert!(matches!(state.take(), Take::Closed));
        assert!(state.is_drained());
    }

    #[test]
    fn cancelled_receive_hands_value_to_next_receiver() {
        let mut state = State::new(Capacity::Bounded(0), Overflow::Suspend);
        let first = state.park_receiver(noop());
        let second = state.park_receiver(noop());

        assert!(matches!(state.offer(3), Offer::Accepted(Some(_))));
        assert!(state.cancel_receiver(first).is_some());
        assert!(matches!(
            state.poll_receiver(second, noop()),
            Some(RecvDone::Received(3))
        ));
    }

    #[test]
    fn cancelled_receive_returns_value_to_buffer() {
        let mut state = State::new(Capacity::Bounded(2), Overflow::Suspend);
        let ticket = state.park_receiver(noop());

        assert!(matches!(state.offer(5), Offer::Accepted(Some(_))));
        assert!(matches!(state.offer(6), Offer::Accepted(None)));
        assert!(state.cancel_receiver(ticket).is_none());
        assert_eq!(drain(&mut state), vec![5, 6]);
    }
}
