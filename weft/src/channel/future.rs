use super::Channel;
use super::state::{Offer, RecvDone, SendDone, Take};
use crate::error::{RecvError, SendError};

use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`Channel::send`].
///
/// Dropping it while suspended withdraws the value from the channel.
#[must_use = "futures do nothing unless awaited"]
pub struct SendFuture<'a, T> {
    channel: &'a Channel<T>,

    /// The value, until it is offered.
    value: Option<T>,

    /// Set while parked in the channel's sender queue.
    ticket: Option<u64>,
}

// The value is moved in and out, never pinned.
impl<T> Unpin for SendFuture<'_, T> {}

impl<'a, T> SendFuture<'a, T> {
    pub(super) fn new(channel: &'a Channel<T>, value: T) -> Self {
        Self {
            channel,
            value: Some(value),
            ticket: None,
        }
    }
}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.channel.lock();

        if let Some(ticket) = this.ticket {
            return match state.poll_sender(ticket, cx.waker()) {
                Some(SendDone::Sent) => {
                    this.ticket = None;
                    Poll::Ready(Ok(()))
                }
                Some(SendDone::Closed(value)) => {
                    this.ticket = None;
                    Poll::Ready(Err(SendError {
                        value,
                        cause: state.cause(),
                    }))
                }
                None => Poll::Pending,
            };
        }

        let value = this.value.take().expect("SendFuture polled after completion");

        match state.offer(value) {
            Offer::Accepted(waker) => {
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
                Poll::Ready(Ok(()))
            }
            Offer::Closed(value) => Poll::Ready(Err(SendError {
                value,
                cause: state.cause(),
            })),
            Offer::Full(value) => {
                this.ticket = Some(state.park_sender(value, cx.waker()));
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let undelivered = self.channel.lock().cancel_sender(ticket);
            drop(undelivered);
        }
    }
}

/// Future returned by [`Channel::receive`].
///
/// Dropping it after a value was handed to it passes that value on to the
/// next receiver.
#[must_use = "futures do nothing unless awaited"]
pub struct RecvFuture<'a, T> {
    channel: &'a Channel<T>,

    /// Set while parked in the channel's receiver queue.
    ticket: Option<u64>,
}

impl<'a, T> RecvFuture<'a, T> {
    pub(super) fn new(channel: &'a Channel<T>) -> Self {
        Self {
            channel,
            ticket: None,
        }
    }
}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.channel.lock();

        if let Some(ticket) = this.ticket {
            return match state.poll_receiver(ticket, cx.waker()) {
                Some(RecvDone::Received(value)) => {
                    this.ticket = None;
                    Poll::Ready(Ok(value))
                }
                Some(RecvDone::Closed) => {
                    this.ticket = None;
                    Poll::Ready(Err(RecvError {
                        cause: state.cause(),
                    }))
                }
                None => Poll::Pending,
            };
        }

        match state.take() {
            Take::Value(value, waker) => {
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
                Poll::Ready(Ok(value))
            }
            Take::Closed => Poll::Ready(Err(RecvError {
                cause: state.cause(),
            })),
            Take::Empty => {
                this.ticket = Some(state.park_receiver(cx.waker()));
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for RecvFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let next = self.channel.lock().cancel_receiver(ticket);

            if let Some(waker) = next {
                waker.wake();
            }
        }
    }
}
