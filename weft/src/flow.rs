//! Cold streams.
//!
//! A [`Flow`] describes how to produce a sequence of values. Nothing runs
//! until it is collected, and every [`collect`](Flow::collect) runs the
//! producer again from the start, as a child task of the collector.
//!
//! The producer and the collector are connected by a rendezvous channel, so
//! the producer only runs ahead by one value. When the collector stops early
//! the producer is cancelled. When the producer returns an error or panics,
//! the collector first receives every value emitted before, then the failure
//! comes out of `collect`.
//!
//! Operators such as [`map`](Flow::map) return a new flow, whose producer
//! collects the upstream flow inside a [`scope`](crate::task::scope).
//!
//! # Examples
//!
//! ```rust,ignore
//! use weft::flow::{self, Flow};
//!
//! let squares: Flow<u32> = flow::flow(|out| async move {
//!     for i in 1..=3 {
//!         out.emit(i * i).await?;
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(squares.map(|n| n + 1).to_vec().await?, [2, 5, 10]);
//! ```

use crate::channel::{self, Capacity, Channel};
use crate::error::{Cause, Error, Failure, Outcome};
use crate::task::{self, JoinHandle};

use std::fmt;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

type BoxedBody = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

type Producer<T> = dyn Fn(Emitter<T>) -> BoxedBody + Send + Sync;

/// A cold stream of `T`.
///
/// Cloning a `Flow` is cheap and shares the producer.
pub struct Flow<T> {
    producer: Arc<Producer<T>>,
}

/// Creates a flow from a producer body.
///
/// `body` runs once per collection and emits values through the
/// [`Emitter`] it is given. Returning `Err` fails the collection, except for
/// the cancellation returned by [`Emitter::emit`] once the collector has
/// stopped.
pub fn flow<T, F, Fut>(body: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Flow::new(body)
}

/// Creates a flow emitting the items of `values`, once per collection.
pub fn flow_of<I>(values: I) -> Flow<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    Flow::new(move |out| {
        let values = values.clone();

        async move {
            for value in values {
                out.emit(value).await?;
            }
            Ok(())
        }
    })
}

/// Creates a flow whose values are sent on a buffered channel.
///
/// `body` gets the sending side and runs as a child of the producer, so it
/// may spawn tasks or register callbacks that keep sending, e.g. with
/// [`Channel::try_send`]. The flow ends once `body` and its children are
/// done and the buffer is drained.
pub fn channel_flow<T, F, Fut>(capacity: Capacity, body: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(Channel<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let body = Arc::new(body);

    Flow::new(move |out| {
        let body = body.clone();

        async move {
            let buffer = channel::produce(capacity, move |tx| body(tx));

            while let Ok(value) = buffer.receive().await {
                out.emit(value).await?;
            }
            Ok(())
        }
    })
}

/// Conversion into a [`Flow`].
pub trait AsFlow {
    type Item;

    fn as_flow(self) -> Flow<Self::Item>;
}

impl<I> AsFlow for I
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    fn as_flow(self) -> Flow<I::Item> {
        flow_of(self)
    }
}

impl<T: Send + 'static> Flow<T> {
    fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move |out: Emitter<T>| -> BoxedBody { Box::pin(body(out)) }),
        }
    }

    /// Runs the producer as a child of the current task.
    fn launch(&self) -> Collector<T> {
        let channel = Channel::rendezvous();
        let failure = Arc::new(Mutex::new(None));

        let body = CatchUnwind((self.producer)(Emitter {
            channel: channel.clone(),
        }));

        let closing = channel.clone();
        let slot = failure.clone();
        let producer = task::spawn(async move {
            if let Err(failure) = body.await.or_else(into_failure) {
                tracing::debug!(%failure, "flow producer failed");
                *slot.lock().unwrap() = Some(failure);
            }
            closing.close();
        });

        let closing = channel.clone();
        producer.invoke_on_completion(move |_| {
            closing.close();
        });

        Collector {
            channel,
            producer,
            failure,
        }
    }

    /// Runs the flow, handing each value to `action` until the flow ends or
    /// `action` breaks.
    ///
    /// # Errors
    ///
    /// Returns `Error::Failed` if the producer failed, or `Error::Cancelled`
    /// if the collecting task was cancelled.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime.
    pub async fn collect<F>(&self, mut action: F) -> Result<(), Error>
    where
        F: FnMut(T) -> ControlFlow<()> + Send,
    {
        task::scope(async {
            let collector = self.launch();

            while let Some(value) = collector.next().await? {
                if action(value).is_break() {
                    break;
                }
            }
            Ok(())
        })
        .await?
    }

    /// Collects every value into a `Vec`.
    pub async fn to_vec(&self) -> Result<Vec<T>, Error> {
        let mut values = Vec::new();

        self.collect(|value| {
            values.push(value);
            ControlFlow::Continue(())
        })
        .await?;

        Ok(values)
    }

    /// Builds a flow whose producer runs `body` against a running upstream.
    fn transform<U, F, Fut>(&self, body: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(Collector<T>, Emitter<U>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let upstream = self.clone();
        let body = Arc::new(body);

        Flow::new(move |out| {
            let upstream = upstream.clone();
            let body = body.clone();

            async move { task::scope(async move { body(upstream.launch(), out).await }).await? }
        })
    }

    pub fn map<U, F>(&self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);

        self.transform(move |upstream, out| {
            let f = f.clone();

            async move {
                while let Some(value) = upstream.next().await? {
                    out.emit(f(value)).await?;
                }
                Ok(())
            }
        })
    }

    pub fn filter<F>(&self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);

        self.transform(move |upstream, out| {
            let predicate = predicate.clone();

            async move {
                while let Some(value) = upstream.next().await? {
                    if predicate(&value) {
                        out.emit(value).await?;
                    }
                }
                Ok(())
            }
        })
    }

    /// Calls `action` on each value before passing it on.
    pub fn on_each<F>(&self, action: F) -> Flow<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let action = Arc::new(action);

        self.transform(move |upstream, out| {
            let action = action.clone();

            async move {
                while let Some(value) = upstream.next().await? {
                    action(&value);
                    out.emit(value).await?;
                }
                Ok(())
            }
        })
    }

    /// Passes on the first `n` values, then cancels the upstream producer.
    pub fn take(&self, n: usize) -> Flow<T> {
        self.transform(move |upstream, out| async move {
            for _ in 0..n {
                let Some(value) = upstream.next().await? else {
                    break;
                };
                out.emit(value).await?;
            }
            Ok(())
        })
    }

    /// Recovers from an upstream failure.
    ///
    /// Values emitted before the failure are passed on, then `handler` runs
    /// with the failure and may emit more values. Failures raised downstream
    /// of `catch` are not seen by it.
    pub fn catch<F, Fut>(&self, handler: F) -> Flow<T>
    where
        F: Fn(Failure, Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let upstream = self.clone();
        let handler = Arc::new(handler);

        Flow::new(move |out| {
            let upstream = upstream.clone();
            let handler = handler.clone();

            async move {
                let forwarded = task::scope(forward(&upstream, &out))
                    .await
                    .and_then(|result| result);

                match forwarded {
                    Err(Error::Failed(failure)) => {
                        tracing::debug!(%failure, "flow failure caught");
                        handler(failure, out).await
                    }
                    other => other,
                }
            }
        })
    }

    /// Calls `action` once the flow ends: completed, failed, or stopped by
    /// the collector.
    pub fn on_completion<F>(&self, action: F) -> Flow<T>
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let action = Arc::new(action);

        Flow::new(move |out| {
            let upstream = upstream.clone();
            let mut completion = Completion {
                action: Some(action.clone()),
            };

            async move {
                let result = task::scope(forward(&upstream, &out))
                    .await
                    .and_then(|result| result);

                let outcome = result.as_ref().map_err(cause_of).copied();
                completion.fire(&outcome);

                result
            }
        })
    }
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow").finish_non_exhaustive()
    }
}

/// Sending side of a running flow, handed to its producer.
pub struct Emitter<T> {
    channel: Channel<T>,
}

impl<T> Emitter<T> {
    /// Hands `value` to the collector, suspending until it is taken.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` once the collector has stopped. Producers
    /// should return it with `?`.
    pub async fn emit(&self, value: T) -> Result<(), Error> {
        self.channel
            .send(value)
            .await
            .map_err(|_| Error::Cancelled(Arc::from("flow collector stopped")))
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}

/// Receiving end of a launched producer. Dropping it stops the producer.
struct Collector<T> {
    channel: Channel<T>,
    producer: JoinHandle<()>,

    /// Set by the producer before it closes the channel.
    failure: Arc<Mutex<Option<Failure>>>,
}

impl<T> Collector<T> {
    /// Next value, `None` at the end of the flow, or the producer's failure
    /// once every value emitted before it was received.
    async fn next(&self) -> Result<Option<T>, Error> {
        if let Ok(value) = self.channel.receive().await {
            return Ok(Some(value));
        }

        match self.failure.lock().unwrap().take() {
            Some(failure) => Err(Error::Failed(failure)),
            None => Ok(None),
        }
    }
}

impl<T> Drop for Collector<T> {
    fn drop(&mut self) {
        self.producer.cancel_with("flow collection stopped");
        self.channel.close();
    }
}

/// Fires the completion action at most once, with a cancellation if the
/// producer was dropped before it finished.
struct Completion<F: Fn(&Outcome)> {
    action: Option<Arc<F>>,
}

impl<F: Fn(&Outcome)> Completion<F> {
    fn fire(&mut self, outcome: &Outcome) {
        if let Some(action) = self.action.take() {
            action(outcome);
        }
    }
}

impl<F: Fn(&Outcome)> Drop for Completion<F> {
    fn drop(&mut self) {
        self.fire(&Err(Cause::cancelled("flow collection stopped")));
    }
}

async fn forward<T: Send + 'static>(upstream: &Flow<T>, out: &Emitter<T>) -> Result<(), Error> {
    let collector = upstream.launch();

    while let Some(value) = collector.next().await? {
        out.emit(value).await?;
    }
    Ok(())
}

/// Turns a panic of the producer body into a failure.
struct CatchUnwind(BoxedBody);

impl Future for CatchUnwind {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let body = self.0.as_mut();

        match panic::catch_unwind(AssertUnwindSafe(|| body.poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => Poll::Ready(Err(Error::Failed(Failure::from_panic(payload)))),
        }
    }
}

/// Maps a producer's result to the failure handed to its collector.
/// Cancellation is a normal end.
fn into_failure(err: Error) -> Result<(), Failure> {
    match err {
        Error::Cancelled(_) => Ok(()),
        Error::Failed(failure) => Err(failure),
        other => Err(Failure::new(other.to_string())),
    }
}

fn cause_of(err: &Error) -> Cause {
    match err {
        Error::Cancelled(reason) => Cause::Cancelled(reason.clone()),
        Error::Failed(failure) => Cause::Failed(failure.clone()),
        other => Cause::Failed(Failure::new(other.to_string())),
    }
}
