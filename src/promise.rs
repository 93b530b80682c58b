//! Single-shot completion cells.
//!
//! A [`Promise`] is the producing half of a one-time value-or-error cell;
//! its [`PromiseFuture`] is the consuming half. The reactor bridge resolves
//! promises from its event threads, the serial valve chains them as release
//! latches, and `spawn` returns one as the fiber's join handle.
//!
//! A `PromiseFuture` can be consumed two ways:
//!
//! - awaited from inside a fiber (the fiber suspends until completion), or
//! - [`wait`](PromiseFuture::wait)ed from a plain thread. If the waiting
//!   thread hosts a fiber scheduler, the wait drives that scheduler so
//!   resident fibers keep making progress while the thread is "blocked".
//!
//! Dropping a `Promise` without completing it abandons the cell: consumers
//! observe a `Cancelled` error rather than hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};
use crate::fiber::worker;

/// Creates a connected promise/future pair.
#[must_use]
pub fn pair<T>() -> (Promise<T>, PromiseFuture<T>) {
    let shared = Arc::new(Shared::new());
    (
        Promise {
            shared: Some(shared.clone()),
        },
        PromiseFuture { shared },
    )
}

/// Outcome of a bounded wait on a [`PromiseFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The promise was completed; the value (or error) can be taken.
    Ready,
    /// The deadline expired first.
    Timeout,
    /// The producer was dropped without completing the promise.
    Abandoned,
}

enum State<T> {
    Pending,
    Complete(Result<T>),
    Taken,
    Abandoned,
}

pub(crate) struct Shared<T> {
    state: Mutex<Inner<T>>,
    cond: Condvar,
}

struct Inner<T> {
    state: State<T>,
    wakers: Vec<Waker>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(Inner {
                state: State::Pending,
                wakers: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// A cell that is already completed with `value`. Used as the serial
    /// valve's initial tail latch.
    pub(crate) fn ready(value: T) -> Arc<Self> {
        let shared = Arc::new(Self::new());
        shared.finish(Ok(value));
        shared
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn finish(&self, result: Result<T>) {
        let wakers = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = State::Complete(result);
            std::mem::take(&mut inner.wakers)
        };
        self.cond.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    fn abandon(&self) {
        let wakers = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = State::Abandoned;
            std::mem::take(&mut inner.wakers)
        };
        self.cond.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        !matches!(self.lock().state, State::Pending)
    }

    /// Takes the terminal value if one is available.
    ///
    /// Panics if the value was already taken; a promise is single-shot.
    fn try_take(&self) -> Option<Result<T>> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, State::Taken) {
            State::Complete(result) => Some(result),
            State::Abandoned => {
                inner.state = State::Abandoned;
                Some(Err(abandoned_error()))
            }
            State::Pending => {
                inner.state = State::Pending;
                None
            }
            State::Taken => panic!("promise value already taken"),
        }
    }
}

fn abandoned_error() -> Error {
    Error::with_context(
        ErrorKind::Cancelled,
        "promise abandoned before completion",
    )
}

/// Producing half of a single-shot cell.
///
/// Completing consumes the promise. Dropping it un-completed abandons the
/// cell and fails the consumer with `Cancelled`.
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    /// Completes the cell with a value, waking the consumer.
    pub fn complete(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.finish(Ok(value));
        }
    }

    /// Completes the cell with an error, waking the consumer.
    pub fn fail(mut self, error: Error) {
        if let Some(shared) = self.shared.take() {
            shared.finish(Err(error));
        }
    }

    /// Completes with a `Result` in one step.
    pub fn complete_result(mut self, result: Result<T>) {
        if let Some(shared) = self.shared.take() {
            shared.finish(result);
        }
    }

    pub(crate) fn shared(&self) -> Arc<Shared<T>> {
        self.shared
            .as_ref()
            .expect("promise already completed")
            .clone()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.abandon();
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.shared.is_none())
            .finish()
    }
}

/// Consuming half of a single-shot cell.
pub struct PromiseFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> PromiseFuture<T> {
    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Current status without consuming the value.
    #[must_use]
    pub fn status(&self) -> WaitStatus {
        match self.shared.lock().state {
            State::Pending => WaitStatus::Timeout,
            State::Abandoned => WaitStatus::Abandoned,
            State::Complete(_) | State::Taken => WaitStatus::Ready,
        }
    }

    /// True once the producer has settled the cell one way or the other.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Blocks the calling thread until the promise settles, then takes the
    /// result.
    ///
    /// If the calling thread hosts a fiber scheduler (worker threads, or any
    /// thread that called [`initialize_fibers`](crate::initialize_fibers)),
    /// resident fibers are driven while waiting. Must not be called from
    /// inside a fiber; await the future there instead.
    pub fn wait(self) -> Result<T> {
        worker::assert_not_in_fiber("PromiseFuture::wait");
        if worker::is_initialized() {
            return worker::block_on(self);
        }
        let shared = self.shared;
        let mut inner = shared.lock();
        loop {
            match std::mem::replace(&mut inner.state, State::Taken) {
                State::Complete(result) => return result,
                State::Abandoned => {
                    inner.state = State::Abandoned;
                    return Err(abandoned_error());
                }
                State::Pending => {
                    inner.state = State::Pending;
                    inner = match shared.cond.wait(inner) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
                State::Taken => panic!("promise value already taken"),
            }
        }
    }

    /// Waits up to `timeout` for the promise to settle.
    ///
    /// Returns the three-state outcome without consuming the value; follow a
    /// `Ready` status with `.await` or [`wait`](Self::wait) to take it. A
    /// zero timeout is a pure status poll. Like `wait`, a scheduler-hosting
    /// thread keeps driving its fibers during the wait.
    #[must_use]
    pub fn wait_for(&self, timeout: Duration) -> WaitStatus {
        let status = self.status();
        if status != WaitStatus::Timeout || timeout.is_zero() {
            return status;
        }
        worker::assert_not_in_fiber("PromiseFuture::wait_for");
        let deadline = Instant::now() + timeout;
        if worker::is_initialized() {
            // Register a waker that interrupts the worker's park, then
            // drive resident fibers until settled or out of time.
            {
                let mut inner = self.shared.lock();
                if matches!(inner.state, State::Pending) {
                    inner.wakers.push(worker::blocker_waker());
                }
            }
            worker::drive_until(deadline, &|| self.shared.is_settled());
            return self.status();
        }
        let mut inner = self.shared.lock();
        while matches!(inner.state, State::Pending) {
            let now = Instant::now();
            if now >= deadline {
                return WaitStatus::Timeout;
            }
            let (guard, _timed_out) = match self.shared.cond.wait_timeout(inner, deadline - now) {
                Ok(pair) => pair,
                Err(poisoned) => {
                    let pair = poisoned.into_inner();
                    (pair.0, pair.1)
                }
            };
            inner = guard;
        }
        drop(inner);
        self.status()
    }
}

impl<T> Future for PromiseFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.shared.try_take() {
            return Poll::Ready(result);
        }
        let mut inner = self.shared.lock();
        // Re-check under the lock: completion may have landed in between.
        if !matches!(inner.state, State::Pending) {
            drop(inner);
            return Poll::Ready(self.shared.try_take().expect("settled promise"));
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> std::fmt::Debug for PromiseFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseFuture")
            .field("status", &self.status())
            .finish()
    }
}
