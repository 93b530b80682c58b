//! Cooperative fibers and the machinery that schedules them.
//!
//! A fiber is a lightweight task with a stable identity, a current state and
//! a *home worker*, the worker thread that resumes it. Fibers are
//! multiplexed onto worker threads by per-worker schedulers
//! ([`scheduler`]), hop between workers through the process-wide
//! [`dispatcher`], and suspend only at explicit points: awaiting a promise,
//! sleeping, yielding, or waiting on a [`Notify`](crate::sync::Notify).
//!
//! The submodules mirror the moving parts:
//!
//! - [`ready_queue`]: lock-free intake of externally-awakened fibers
//! - [`scheduler`]: per-worker scheduler with a pluggable run policy
//! - [`dispatcher`]: worker registry plus the pending-migrations table
//! - [`pool`]: the shared worker pool behind `do_parallel`
//! - [`worker`]: thread bootstrap, `initialize_fibers`, `block_on`
//! - [`timer`]: sleeps and the per-worker timer heap
//! - [`spawn`]: the `spawn` / `schedule_at` / `do_parallel` façade
//! - [`names`]: one-shot thread and fiber names

pub(crate) mod dispatcher;
pub(crate) mod names;
pub(crate) mod pool;
pub(crate) mod ready_queue;
pub(crate) mod scheduler;
pub(crate) mod spawn;
pub(crate) mod timer;
pub(crate) mod worker;

pub use dispatcher::set_fiber_destination;
pub use names::{get_fiber_name, get_thread_name, set_fiber_name, set_thread_name};
pub use pool::WorkerPool;
pub use spawn::{do_parallel, migrate_to, schedule_at, spawn, spawn_with, SpawnOptions};
pub use timer::{sleep, sleep_until, yield_now, Sleep, YieldNow};
pub use worker::{block_on, current_worker_id, initialize_fibers};

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::task::Wake;

/// Identity of a fiber, stable across suspensions and migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(pub(crate) u64);

impl FiberId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for FiberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fiber #{}", self.0)
    }
}

/// Identity of a worker thread hosting a fiber scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker #{}", self.0)
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// Fiber lifecycle states. Transitions:
//   QUEUED -> RUNNING            (worker picks the fiber)
//   RUNNING -> SUSPENDED         (poll returned Pending, no wake arrived)
//   RUNNING -> NOTIFIED          (wake arrived while running)
//   NOTIFIED -> QUEUED           (worker requeues after poll)
//   SUSPENDED -> QUEUED          (wake; the waker enqueues the fiber)
//   RUNNING -> FINISHED          (body returned or panicked)
pub(crate) const QUEUED: u8 = 0;
pub(crate) const RUNNING: u8 = 1;
pub(crate) const NOTIFIED: u8 = 2;
pub(crate) const SUSPENDED: u8 = 3;
pub(crate) const FINISHED: u8 = 4;

/// A fiber: identity, state, home worker and the suspended body.
pub(crate) struct Fiber {
    id: FiberId,
    /// Free fibers belong to the shared pool queue and may run on any pool
    /// worker; non-free fibers stay with their home worker unless an
    /// explicit migration destination is set for them.
    free: bool,
    name: OnceLock<String>,
    home: AtomicU64,
    state: AtomicU8,
    future: Mutex<Option<BoxFuture>>,
}

impl Fiber {
    pub(crate) fn new(future: BoxFuture, free: bool, name: Option<String>) -> Arc<Self> {
        let fiber = Self {
            id: FiberId::next(),
            free,
            name: OnceLock::new(),
            home: AtomicU64::new(0),
            state: AtomicU8::new(QUEUED),
            future: Mutex::new(Some(future)),
        };
        if let Some(name) = name {
            let _ = fiber.name.set(name);
        }
        Arc::new(fiber)
    }

    pub(crate) fn id(&self) -> FiberId {
        self.id
    }

    pub(crate) fn is_free(&self) -> bool {
        self.free
    }

    pub(crate) fn name_cell(&self) -> &OnceLock<String> {
        &self.name
    }

    /// The worker currently responsible for resuming this fiber. Zero until
    /// first scheduled.
    pub(crate) fn home(&self) -> Option<WorkerId> {
        match self.home.load(Ordering::Acquire) {
            0 => None,
            id => Some(WorkerId(id)),
        }
    }

    pub(crate) fn set_home(&self, worker: WorkerId) {
        self.home.store(worker.0, Ordering::Release);
    }

    pub(crate) fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    pub(crate) fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn take_future(&self) -> Option<BoxFuture> {
        match self.future.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub(crate) fn store_future(&self, future: BoxFuture) {
        match self.future.lock() {
            Ok(mut slot) => *slot = Some(future),
            Err(poisoned) => *poisoned.into_inner() = Some(future),
        }
    }

    /// Makes the fiber runnable again. Safe to call from any thread and at
    /// any time; wakes while running are latched and consumed after the
    /// current poll, duplicate wakes coalesce.
    pub(crate) fn wake(self: &Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                SUSPENDED => {
                    if self.transition(SUSPENDED, QUEUED) {
                        worker::route(self.clone());
                        return;
                    }
                }
                RUNNING => {
                    if self.transition(RUNNING, NOTIFIED) {
                        return;
                    }
                }
                // Already queued, already latched, or done.
                _ => return,
            }
        }
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("free", &self.free)
            .field("home", &self.home())
            .field("state", &self.state())
            .finish()
    }
}

/// Waker adapter: waking re-enqueues the fiber on its home worker.
pub(crate) struct FiberWaker {
    pub(crate) fiber: Arc<Fiber>,
}

impl Wake for FiberWaker {
    fn wake(self: Arc<Self>) {
        self.fiber.wake();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.fiber.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_fiber() -> Arc<Fiber> {
        Fiber::new(Box::pin(async {}), false, None)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = noop_fiber();
        let b = noop_fiber();
        assert!(b.id() > a.id());
    }

    #[test]
    fn wake_on_finished_is_a_no_op() {
        let fiber = noop_fiber();
        fiber.set_state(FINISHED);
        fiber.wake();
        assert_eq!(fiber.state(), FINISHED);
    }

    #[test]
    fn wake_while_running_latches() {
        let fiber = noop_fiber();
        fiber.set_state(RUNNING);
        fiber.wake();
        assert_eq!(fiber.state(), NOTIFIED);
        // A second wake coalesces.
        fiber.wake();
        assert_eq!(fiber.state(), NOTIFIED);
    }

    #[test]
    fn home_starts_unset() {
        let fiber = noop_fiber();
        assert!(fiber.home().is_none());
        fiber.set_home(WorkerId(3));
        assert_eq!(fiber.home(), Some(WorkerId(3)));
    }
}
