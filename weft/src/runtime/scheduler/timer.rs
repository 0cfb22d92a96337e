use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use std::task::Waker;
use std::time::Instant;

/// An entry in the delayed queue.
///
/// `TimerEntry` is a parked continuation waiting for a deadline. Entries are
/// stored in a `BinaryHeap` and popped earliest deadline first; entries
/// sharing a deadline come out in the order they were enqueued.
pub(crate) struct TimerEntry {
    /// The time at which the continuation becomes ready.
    pub(crate) deadline: Instant,

    /// Enqueue order, used to break ties between equal deadlines.
    pub(crate) seq: u64,

    /// Waker re-enqueueing the continuation.
    pub(crate) waker: Waker,

    /// Set when the owning sleep is dropped before firing.
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` behaves as a min-heap on
    /// `(deadline, seq)`.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BinaryHeap;
    use std::task::Waker;
    use std::time::Duration;

    fn entry(deadline: Instant, seq: u64) -> TimerEntry {
        TimerEntry {
            deadline,
            seq,
            waker: Waker::noop().clone(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn pops_earliest_deadline_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();

        heap.push(entry(now + Duration::from_millis(30), 0));
        heap.push(entry(now + Duration::from_millis(10), 1));
        heap.push(entry(now + Duration::from_millis(20), 2));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn equal_deadlines_keep_enqueue_order() {
        let deadline = Instant::now() + Duration::from_millis(5);
        let mut heap = BinaryHeap::new();

        for seq in [3, 0, 2, 1] {
            heap.push(entry(deadline, seq));
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
