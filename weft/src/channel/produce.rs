use super::{Capacity, Channel, Overflow};
use crate::error::Cause;
use crate::task;

/// Spawns `body` as a child of the current task, feeding a new channel,
/// and returns the receiving side.
///
/// The channel is closed once the producing task is terminal. If it failed
/// or was cancelled, the cause is recorded on the channel, so receivers see
/// why the stream ended.
///
/// # Panics
///
/// Panics if called outside of a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let numbers = produce(Capacity::Bounded(4), |tx| async move {
///     for i in 0..10 {
///         if tx.send(i).await.is_err() {
///             break;
///         }
///     }
/// });
///
/// while let Ok(n) = numbers.receive().await {
///     println!("{n}");
/// }
/// ```
pub fn produce<T, F, Fut>(capacity: Capacity, body: F) -> Channel<T>
where
    T: Send + 'static,
    F: FnOnce(Channel<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let channel = Channel::new(capacity, Overflow::Suspend);
    spawn_attached(&channel, body, "producer");
    channel
}

/// Spawns `body` on `channel` and closes the channel, recording the cause,
/// once the spawned task is terminal.
pub(super) fn spawn_attached<T, F, Fut>(channel: &Channel<T>, body: F, role: &'static str)
where
    T: Send + 'static,
    F: FnOnce(Channel<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let spawned = task::spawn(body(channel.clone()));

    let closing = channel.clone();
    spawned.invoke_on_completion(move |outcome| {
        match outcome {
            Ok(()) => closing.close(),
            Err(Cause::Failed(failure)) => closing.close_with(format!("{role} failed: {failure}")),
            Err(Cause::Cancelled(reason)) => closing.close_with(format!("{role} cancelled: {reason}")),
        };
    });
}
