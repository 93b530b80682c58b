//! The reactor bridge: completion promises over an OS event loop.
//!
//! One process-wide [`Reactor`] turns readiness-style socket events into
//! resolved promises. A submission performs the nonblocking syscall once on
//! the calling thread; if the descriptor is not ready, the operation record
//! is parked in a per-descriptor table and the poller is armed. A reactor
//! thread re-runs the attempt when the event fires and resolves the
//! promise, waking only the fiber that awaited it.
//!
//! The loop is driven by a fixed pool of threads (sized by
//! [`crate::config::set_reactor_threads`], immutable after first use): at
//! any moment one thread is the poller, the rest execute queued jobs such
//! as resolver lookups. Threads run until the reactor's work guards are
//! released. A panic inside a job is logged and the loop continues.
//!
//! Cancellation is by deregistration: closing a socket removes its table
//! entry and fails the parked operations, which the awaiting fibers observe
//! as errors at their suspension point.

pub(crate) mod op;
pub(crate) mod poll_service;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use polling::{Event, Poller};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config;
use crate::error::{Error, ErrorKind};
use crate::fiber::names::set_thread_name;
use crate::promise::{self, PromiseFuture};

use op::{Direction, IoStep, OpPoll, ReadinessOp};

/// How long the polling thread blocks before re-checking for teardown.
const POLL_TICK: Duration = Duration::from_millis(100);
/// How long idle non-polling threads park between job checks.
const IDLE_TICK: Duration = Duration::from_millis(50);

#[derive(Default)]
struct FdEntry {
    read: Option<Box<dyn IoStep>>,
    write: Option<Box<dyn IoStep>>,
    added: bool,
}

/// The event loop and its operation table.
pub(crate) struct Reactor {
    poller: Poller,
    entries: Mutex<HashMap<usize, FdEntry>>,
    jobs: SegQueue<Box<dyn FnOnce() + Send>>,
    poll_slot: Mutex<Vec<Event>>,
    idle_mutex: Mutex<()>,
    idle_cond: Condvar,
    guards: AtomicUsize,
}

/// Keeps the reactor threads alive while held.
pub(crate) struct WorkGuard {
    reactor: Arc<Reactor>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.reactor.guards.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.reactor.fail_all_pending();
            let _ = self.reactor.poller.notify();
            self.reactor.idle_cond.notify_all();
        }
    }
}

impl Reactor {
    /// Starts a reactor driven by `threads` event threads and returns it
    /// with its initial work guard.
    pub(crate) fn start(threads: u16) -> std::io::Result<(Arc<Self>, WorkGuard)> {
        assert!(threads > 0, "the reactor needs at least one thread");
        let reactor = Arc::new(Self {
            poller: Poller::new()?,
            entries: Mutex::new(HashMap::new()),
            jobs: SegQueue::new(),
            poll_slot: Mutex::new(Vec::with_capacity(64)),
            idle_mutex: Mutex::new(()),
            idle_cond: Condvar::new(),
            guards: AtomicUsize::new(1),
        });
        for index in 0..threads {
            let reactor = reactor.clone();
            std::thread::Builder::new()
                .name(format!("reactor-{index}"))
                .spawn(move || {
                    set_thread_name(format!("reactor #{index}"));
                    reactor.run();
                })?;
        }
        tracing::debug!(threads, "reactor started");
        let guard = WorkGuard {
            reactor: reactor.clone(),
        };
        Ok((reactor, guard))
    }

    /// The process-wide reactor, created on first use with the configured
    /// thread count. Its work guard is held for the life of the process.
    pub(crate) fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<(Arc<Reactor>, WorkGuard)> = OnceLock::new();
        let (reactor, _guard) = GLOBAL.get_or_init(|| {
            Reactor::start(config::reactor_threads()).expect("starting the process reactor")
        });
        reactor
    }

    fn stopping(&self) -> bool {
        self.guards.load(Ordering::Acquire) == 0
    }

    fn run(self: Arc<Self>) {
        loop {
            while let Some(job) = self.jobs.pop() {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("unhandled panic in reactor job; loop continues");
                }
            }
            if self.stopping() && self.jobs.is_empty() {
                return;
            }
            if let Some(mut events) = self.poll_slot.try_lock() {
                events.clear();
                match self.poller.wait(&mut events, Some(POLL_TICK)) {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::error!(error = %e, "reactor poll failed");
                    }
                }
                let fired: Vec<Event> = events.drain(..).collect();
                drop(events);
                self.dispatch(fired);
            } else {
                let mut idle = self.idle_mutex.lock();
                if self.jobs.is_empty() && !self.stopping() {
                    self.idle_cond.wait_for(&mut idle, IDLE_TICK);
                }
            }
        }
    }

    fn dispatch(&self, fired: Vec<Event>) {
        for event in fired {
            let key = event.key;
            let (read, write) = {
                let mut entries = self.entries.lock();
                let Some(entry) = entries.get_mut(&key) else {
                    continue;
                };
                let read = if event.readable {
                    entry.read.take()
                } else {
                    None
                };
                let write = if event.writable {
                    entry.write.take()
                } else {
                    None
                };
                (read, write)
            };
            if let Some(mut step) = read {
                if !step.attempt() {
                    self.park(key, Direction::Read, step);
                }
            }
            if let Some(mut step) = write {
                if !step.attempt() {
                    self.park(key, Direction::Write, step);
                }
            }
            self.refresh_interest(key);
        }
    }

    /// Submits a readiness-driven operation on `fd`.
    ///
    /// `attempt` runs once inline; if the descriptor is not ready the
    /// operation is parked and retried from the event loop. The returned
    /// future resolves with the attempt's result.
    pub(crate) fn submit<T, F>(&self, fd: RawFd, dir: Direction, attempt: F) -> PromiseFuture<T>
    where
        F: FnMut() -> OpPoll<T> + Send + 'static,
        T: Send + 'static,
    {
        let (promise, future) = promise::pair();
        let mut step = ReadinessOp::new(attempt, promise);
        if step.attempt() {
            return future;
        }
        self.park(fd as usize, dir, Box::new(step));
        self.refresh_interest(fd as usize);
        future
    }

    /// Stores a not-yet-complete step in the descriptor table.
    fn park(&self, key: usize, dir: Direction, step: Box<dyn IoStep>) {
        if self.stopping() {
            let mut step = step;
            step.cancel(Error::with_context(
                ErrorKind::Shutdown,
                "reactor is shutting down",
            ));
            return;
        }
        let mut entries = self.entries.lock();
        let entry = entries.entry(key).or_default();
        let slot = match dir {
            Direction::Read => &mut entry.read,
            Direction::Write => &mut entry.write,
        };
        assert!(
            slot.is_none(),
            "one in-flight operation per direction per descriptor"
        );
        *slot = Some(step);
    }

    /// Re-arms the poller with the union of interests still parked for
    /// `key`, registering the descriptor on first use.
    fn refresh_interest(&self, key: usize) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            return;
        };
        let interest = match (entry.read.is_some(), entry.write.is_some()) {
            (true, true) => Event::all(key),
            (true, false) => Event::readable(key),
            (false, true) => Event::writable(key),
            (false, false) => Event::none(key),
        };
        let result = if entry.added {
            self.poller.modify(key as RawFd, interest)
        } else {
            match self.poller.add(key as RawFd, interest) {
                Ok(()) => {
                    entry.added = true;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            tracing::error!(key, error = %e, "arming poller failed");
            let mut failed = entries.remove(&key).expect("entry present");
            drop(entries);
            let err = Error::from(e);
            if let Some(step) = failed.read.as_mut() {
                step.cancel(err.clone());
            }
            if let Some(step) = failed.write.as_mut() {
                step.cancel(err);
            }
        }
    }

    /// Removes a descriptor and fails its parked operations. Closing the
    /// underlying resource is how pending I/O is cancelled.
    pub(crate) fn deregister(&self, fd: RawFd) {
        let entry = self.entries.lock().remove(&(fd as usize));
        let Some(mut entry) = entry else { return };
        if entry.added {
            let _ = self.poller.delete(fd);
        }
        let err = Error::with_context(ErrorKind::Cancelled, "stream closed");
        if let Some(step) = entry.read.as_mut() {
            step.cancel(err.clone());
        }
        if let Some(step) = entry.write.as_mut() {
            step.cancel(err);
        }
    }

    /// Runs `job` on a reactor thread. Used for work that must not block
    /// fiber workers, such as resolver lookups.
    pub(crate) fn spawn_job(&self, job: impl FnOnce() + Send + 'static) {
        self.jobs.push(Box::new(job));
        self.idle_cond.notify_one();
        let _ = self.poller.notify();
    }

    fn fail_all_pending(&self) {
        let drained: Vec<FdEntry> = {
            let mut entries = self.entries.lock();
            let keys: Vec<usize> = entries.keys().copied().collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k))
                .collect()
        };
        let err = Error::with_context(ErrorKind::Shutdown, "reactor is shutting down");
        for mut entry in drained {
            if let Some(step) = entry.read.as_mut() {
                step.cancel(err.clone());
            }
            if let Some(step) = entry.write.as_mut() {
                step.cancel(err.clone());
            }
        }
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("pending_fds", &self.entries.lock().len())
            .field("guards", &self.guards.load(Ordering::Relaxed))
            .finish()
    }
}
