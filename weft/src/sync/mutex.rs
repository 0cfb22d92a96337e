use crate::error::Error;
use crate::job::JobId;
use crate::runtime::context::current_job;

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use std::task::{Context, Poll, Waker};

/// A cooperative mutex.
///
/// Unlike `std::sync::Mutex`, waiting for the lock suspends the task
/// instead of blocking the thread, so the guard may be held across
/// suspension points. Waiters acquire the lock in FIFO order.
///
/// The lock is owned by a task, not a thread: a guard may be released on a
/// different worker thread than the one that acquired it. A task trying to
/// lock a mutex it already holds gets [`Error::ReentrantLock`] instead of
/// deadlocking.
pub struct Mutex<T> {
    state: StdMutex<LockState>,
    data: UnsafeCell<T>,
}

struct LockState {
    locked: bool,

    /// Task holding the lock, when acquired from inside a runtime.
    owner: Option<JobId>,

    /// Queued lock futures, oldest first.
    waiters: VecDeque<(u64, Waker)>,

    next_ticket: u64,
}

// Safety: access to `data` is serialized by `locked`.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: StdMutex::new(LockState {
                locked: false,
                owner: None,
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, suspending the current task while it is held
    /// elsewhere.
    ///
    /// # Errors
    ///
    /// Resolves to [`Error::ReentrantLock`] if the current task already
    /// holds the lock.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let mut guard = mutex.lock().await?;
    /// *guard += 1;
    /// ```
    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture {
            mutex: self,
            ticket: None,
        }
    }

    /// Acquires the lock if it is free and nobody is queued for it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.lock().unwrap();

        if state.locked || !state.waiters.is_empty() {
            return None;
        }

        state.locked = true;
        state.owner = current_owner();
        Some(MutexGuard::new(self))
    }

    /// Returns `true` while some task holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.lock().unwrap().locked
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn unlock(&self) {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.locked = false;
            state.owner = None;
            state.waiters.front().map(|(_, waker)| waker.clone())
        };

        if let Some(waker) = next {
            waker.wake();
        }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// The task owning the current continuation. Scopes run inline in their
/// task, so they share its ownership.
fn current_owner() -> Option<JobId> {
    current_job().map(|job| job.owner().id())
}

/// Future returned by [`Mutex::lock`].
#[must_use = "futures do nothing unless awaited"]
pub struct LockFuture<'a, T> {
    mutex: &'a Mutex<T>,

    /// Position in the wait queue once enqueued.
    ticket: Option<u64>,
}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = Result<MutexGuard<'a, T>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let owner = current_owner();
        let mut state = this.mutex.state.lock().unwrap();

        if state.locked && owner.is_some() && state.owner == owner {
            return Poll::Ready(Err(Error::ReentrantLock));
        }

        let first = state.waiters.front().map(|(ticket, _)| *ticket);
        let turn = match (this.ticket, first) {
            (_, None) => true,
            (Some(ticket), Some(first)) => ticket == first,
            (None, Some(_)) => false,
        };

        if !state.locked && turn {
            if this.ticket.take().is_some() {
                state.waiters.pop_front();
            }

            state.locked = true;
            state.owner = owner;
            return Poll::Ready(Ok(MutexGuard::new(this.mutex)));
        }

        match this.ticket {
            Some(ticket) => {
                if let Some((_, waker)) = state.waiters.iter_mut().find(|(t, _)| *t == ticket) {
                    waker.clone_from(cx.waker());
                }
            }
            None => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.waiters.push_back((ticket, cx.waker().clone()));
                this.ticket = Some(ticket);
            }
        }

        Poll::Pending
    }
}

impl<T> Drop for LockFuture<'_, T> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };

        let next = {
            let mut state = self.mutex.state.lock().unwrap();
            let was_first = state.waiters.front().is_some_and(|(t, _)| *t == ticket);
            state.waiters.retain(|(t, _)| *t != ticket);

            // The lock may have been handed to this waiter already.
            if was_first && !state.locked {
                state.waiters.front().map(|(_, waker)| waker.clone())
            } else {
                None
            }
        };

        if let Some(waker) = next {
            waker.wake();
        }
    }
}

/// Guard returned by [`Mutex::lock`]. Releases the lock when dropped and
/// wakes the oldest waiter.
///
/// Like `std::sync::MutexGuard`, it can only be shared between threads when
/// `T` itself is `Sync`:
///
/// ```compile_fail
/// fn is_sync<T: Sync>() {}
/// is_sync::<weft::sync::MutexGuard<'static, std::cell::Cell<i32>>>();
/// ```
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
