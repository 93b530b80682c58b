//! Sleeps, yields, and the per-worker timer heap.
//!
//! Each worker keeps a min-heap of `(deadline, waker)` entries. The worker
//! loop wakes due entries before every pick and parks no longer than the
//! earliest remaining deadline. A sleeping fiber that migrates simply
//! re-registers on its new worker at the next poll; stale entries on the
//! old worker fire a harmless extra wake.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use super::worker;

pub(crate) struct TimerHeap {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn insert(&mut self, deadline: Instant, waker: Waker) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry {
            deadline,
            seq,
            waker,
        }));
    }

    /// Removes all entries due at `now` and returns their wakers.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<Waker> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().expect("peeked entry");
            due.push(entry.waker);
        }
        due
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }
}

/// Suspends the current fiber until `deadline`. A past deadline completes
/// on the first poll.
#[must_use]
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep { deadline }
}

/// Suspends the current fiber for `duration`.
#[must_use]
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
    }
}

/// Future returned by [`sleep`] and [`sleep_until`].
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        worker::register_timer(self.deadline, cx.waker().clone());
        Poll::Pending
    }
}

/// Reschedules the current fiber behind its peers: the explicit yield.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
