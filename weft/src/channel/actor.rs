use super::produce::spawn_attached;
use super::{Capacity, Channel, Overflow};

/// Spawns `handler` as a child of the current task, reading a new mailbox,
/// and returns the sending side.
///
/// The actor owns its state and processes one message at a time, so the
/// state needs no lock. Once the actor is terminal the mailbox is closed:
/// further sends fail, with the failure or cancellation cause when the actor
/// did not simply return.
///
/// # Panics
///
/// Panics if called outside of a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// enum Counter {
///     Add(i64),
///     Get(Channel<i64>),
/// }
///
/// let counter = actor(Capacity::Bounded(16), |mailbox| async move {
///     let mut total = 0;
///     while let Ok(message) = mailbox.receive().await {
///         match message {
///             Counter::Add(n) => total += n,
///             Counter::Get(reply) => {
///                 let _ = reply.send(total).await;
///             }
///         }
///     }
/// });
///
/// counter.send(Counter::Add(2)).await?;
/// ```
pub fn actor<M, F, Fut>(capacity: Capacity, handler: F) -> Channel<M>
where
    M: Send + 'static,
    F: FnOnce(Channel<M>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mailbox = Channel::new(capacity, Overflow::Suspend);
    spawn_attached(&mailbox, handler, "actor");
    mailbox
}
