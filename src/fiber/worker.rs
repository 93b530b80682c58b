//! Worker-thread bootstrap and the fiber run loop.
//!
//! A thread becomes a worker by installing a [`WorkerScheduler`] in
//! thread-local storage: pool threads do this on startup, and any other
//! thread that wants to host fibers (or receive migrated ones) calls
//! [`initialize_fibers`] once. The scheduler stays registered with the
//! dispatcher until the thread exits.
//!
//! [`block_on`] is the bridge for plain code: it polls an outer future
//! while running resident fibers in between, parking on the worker's
//! blocker when neither has progress to make.

use std::cell::RefCell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Instant;

use super::dispatcher;
use super::scheduler::{Blocker, RoundRobin, RunPolicy, WorkerScheduler};
use super::{Fiber, FiberWaker, WorkerId, FINISHED, NOTIFIED, QUEUED, RUNNING, SUSPENDED};

thread_local! {
    static SCHEDULER: RefCell<Option<WorkerScheduler>> = const { RefCell::new(None) };
    static CURRENT_FIBER: RefCell<Option<Arc<Fiber>>> = const { RefCell::new(None) };
}

/// Prepares the current thread to host fibers.
///
/// One-shot per thread that intends to participate in cross-thread
/// migration or to run fibers at all; calling it again is a no-op. Worker
/// pool threads are initialized automatically.
pub fn initialize_fibers() {
    let installed = SCHEDULER.with(|slot| slot.borrow().is_some());
    if !installed {
        let _ = install(Box::new(RoundRobin::new()));
    }
}

/// Installs a scheduler with the given policy on this thread.
///
/// # Panics
///
/// Panics if the thread already hosts a scheduler.
pub(crate) fn install(policy: Box<dyn RunPolicy>) -> Arc<super::scheduler::WorkerShared> {
    SCHEDULER.with(|slot| {
        let mut slot = slot.borrow_mut();
        assert!(
            slot.is_none(),
            "thread already hosts a fiber scheduler (initialize_fibers called twice?)"
        );
        let scheduler = WorkerScheduler::new(policy);
        let shared = scheduler.shared();
        *slot = Some(scheduler);
        shared
    })
}

/// Tears the scheduler down early (pool threads on exit). Dropping the
/// scheduler delists the worker.
pub(crate) fn uninstall() {
    SCHEDULER.with(|slot| slot.borrow_mut().take());
}

/// The id of the worker hosted by this thread.
///
/// # Panics
///
/// Panics if the thread has no scheduler; call
/// [`initialize_fibers`](crate::initialize_fibers) first.
#[must_use]
pub fn current_worker_id() -> WorkerId {
    current_worker().expect("no fiber scheduler on this thread; call initialize_fibers first")
}

pub(crate) fn current_worker() -> Option<WorkerId> {
    SCHEDULER.with(|slot| slot.borrow().as_ref().map(WorkerScheduler::id))
}

pub(crate) fn is_initialized() -> bool {
    SCHEDULER.with(|slot| slot.borrow().is_some())
}

/// The fiber currently being polled on this thread, if any.
pub(crate) fn current_fiber() -> Option<Arc<Fiber>> {
    CURRENT_FIBER.with(|slot| slot.borrow().clone())
}

pub(crate) fn assert_not_in_fiber(what: &str) {
    assert!(
        current_fiber().is_none(),
        "{what} must not be called from inside a fiber; await the future instead"
    );
}

fn with_scheduler<R>(f: impl FnOnce(&mut WorkerScheduler) -> R) -> R {
    SCHEDULER.with(|slot| {
        let mut slot = slot.borrow_mut();
        let scheduler = slot
            .as_mut()
            .expect("no fiber scheduler on this thread; call initialize_fibers first");
        f(scheduler)
    })
}

/// Registers a timer on this worker's heap. Used by `sleep_until`.
pub(crate) fn register_timer(deadline: Instant, waker: Waker) {
    with_scheduler(|s| s.register_timer(deadline, waker));
}

/// Makes an awakened fiber runnable: locally when this thread is its home
/// worker, through the dispatcher otherwise.
pub(crate) fn route(fiber: Arc<Fiber>) {
    let local = current_worker();
    match (fiber.home(), local) {
        (Some(home), Some(here)) if home == here => submit_local(fiber),
        (None, Some(_)) => submit_local(fiber),
        _ => dispatcher::deliver_home(fiber),
    }
}

/// Feeds a fiber to this thread's scheduler.
pub(crate) fn submit_local(fiber: Arc<Fiber>) {
    with_scheduler(|s| s.on_awakened(fiber));
}

/// Wakes due timers. Wakers run after the scheduler borrow is released,
/// because waking re-enters `submit_local`.
fn tick_timers() {
    let wakers = with_scheduler(|s| s.expire_timers(Instant::now()));
    for waker in wakers {
        waker.wake();
    }
}

/// Polls one fiber to its next suspension point.
pub(crate) fn run_fiber(fiber: &Arc<Fiber>) {
    fiber.set_state(RUNNING);
    let Some(mut future) = fiber.take_future() else {
        fiber.set_state(FINISHED);
        return;
    };
    let waker = Waker::from(Arc::new(FiberWaker {
        fiber: fiber.clone(),
    }));
    let mut cx = Context::from_waker(&waker);

    let previous = CURRENT_FIBER.with(|slot| slot.borrow_mut().replace(fiber.clone()));
    let poll = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
    CURRENT_FIBER.with(|slot| *slot.borrow_mut() = previous);

    match poll {
        Ok(Poll::Ready(())) => fiber.set_state(FINISHED),
        Ok(Poll::Pending) => {
            fiber.store_future(future);
            if !fiber.transition(RUNNING, SUSPENDED) {
                // A wake arrived mid-poll (state is NOTIFIED): requeue now.
                debug_assert_eq!(fiber.state(), NOTIFIED);
                fiber.set_state(QUEUED);
                submit_local(fiber.clone());
            }
        }
        Err(_panic) => {
            // The future (and the join promise inside it) is gone; joiners
            // observe abandonment. The worker itself survives.
            fiber.set_state(FINISHED);
            tracing::error!(fiber = %fiber.id(), "fiber body panicked");
        }
    }
}

/// The main loop of a dedicated worker thread: run fibers until `stop`.
pub(crate) fn run_until(stop: &dyn Fn() -> bool) {
    loop {
        if stop() {
            return;
        }
        tick_timers();
        match with_scheduler(|s| s.pick_next()) {
            Some(fiber) => run_fiber(&fiber),
            None => {
                if stop() {
                    return;
                }
                let deadline = with_scheduler(|s| s.next_timer_deadline());
                let blocker = with_scheduler(|s| s.blocker());
                blocker.suspend_until(deadline);
            }
        }
    }
}

struct BlockerWaker {
    blocker: Arc<dyn Blocker>,
}

impl Wake for BlockerWaker {
    fn wake(self: Arc<Self>) {
        self.blocker.notify();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.blocker.notify();
    }
}

/// A waker that nudges this thread's blocker. Bounded waits on promises
/// register one so a completion interrupts the park.
pub(crate) fn blocker_waker() -> Waker {
    let blocker = with_scheduler(|s| s.blocker());
    Waker::from(Arc::new(BlockerWaker { blocker }))
}

/// Runs a future to completion on this thread, driving resident fibers
/// while it waits.
///
/// Initializes the thread's scheduler if needed. Must not be called from
/// inside a fiber.
pub fn block_on<F: Future>(future: F) -> F::Output {
    assert_not_in_fiber("block_on");
    initialize_fibers();

    let mut future = std::pin::pin!(future);
    let blocker = with_scheduler(|s| s.blocker());
    let waker = Waker::from(Arc::new(BlockerWaker {
        blocker: blocker.clone(),
    }));
    let mut cx = Context::from_waker(&waker);

    loop {
        if let Poll::Ready(value) = future.as_mut().poll(&mut cx) {
            return value;
        }
        loop {
            tick_timers();
            let Some(fiber) = with_scheduler(|s| s.pick_next()) else {
                break;
            };
            run_fiber(&fiber);
        }
        if with_scheduler(|s| s.has_ready()) {
            continue;
        }
        let deadline = with_scheduler(|s| s.next_timer_deadline());
        blocker.suspend_until(deadline);
    }
}

/// Drives resident fibers until `done` reports true or `deadline` passes.
/// Used by bounded waits on promises.
pub(crate) fn drive_until(deadline: Instant, done: &dyn Fn() -> bool) {
    while !done() && Instant::now() < deadline {
        tick_timers();
        match with_scheduler(|s| s.pick_next()) {
            Some(fiber) => run_fiber(&fiber),
            None => {
                let timer = with_scheduler(|s| s.next_timer_deadline());
                let park_until = match timer {
                    Some(t) if t < deadline => t,
                    _ => deadline,
                };
                let blocker = with_scheduler(|s| s.blocker());
                blocker.suspend_until(Some(park_until));
            }
        }
    }
}
