use super::Task;

use std::mem;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Vtable for wakers backed by an `Arc<Task<T>>`.
fn vtable<T: Send + 'static>() -> &'static RawWakerVTable {
    &RawWakerVTable::new(
        clone_raw::<T>,
        wake_raw::<T>,
        wake_by_ref_raw::<T>,
        drop_raw::<T>,
    )
}

/// Creates a [`Waker`] that re-enqueues `task` when woken.
///
/// Every raw pointer handed to the vtable comes from `Arc::into_raw`, and
/// each vtable entry keeps the strong count balanced.
pub(crate) fn make_waker<T: Send + 'static>(task: Arc<Task<T>>) -> Waker {
    // Safety: the vtable below upholds the `RawWaker` contract for this pointer.
    unsafe {
        Waker::from_raw(RawWaker::new(
            Arc::into_raw(task) as *const (),
            vtable::<T>(),
        ))
    }
}

fn clone_raw<T: Send + 'static>(ptr: *const ()) -> RawWaker {
    let task = unsafe { Arc::<Task<T>>::from_raw(ptr as *const Task<T>) };
    let cloned = task.clone();
    mem::forget(task);

    RawWaker::new(Arc::into_raw(cloned) as *const (), vtable::<T>())
}

fn wake_raw<T: Send + 'static>(ptr: *const ()) {
    let task = unsafe { Arc::<Task<T>>::from_raw(ptr as *const Task<T>) };
    task.wake();
}

fn wake_by_ref_raw<T: Send + 'static>(ptr: *const ()) {
    let task = unsafe { Arc::<Task<T>>::from_raw(ptr as *const Task<T>) };
    task.clone().wake();
    mem::forget(task);
}

fn drop_raw<T: Send + 'static>(ptr: *const ()) {
    drop(unsafe { Arc::<Task<T>>::from_raw(ptr as *const Task<T>) });
}
