//! The shared worker pool behind `do_parallel`.
//!
//! A fixed number of threads, each hosting a scheduler whose policy knows
//! two kinds of work: fibers pinned to that worker (spawned there, or
//! migrated there explicitly) and *free* fibers living in a pool-wide
//! lock-free queue that any idle worker claims. Pinned work always takes
//! precedence for its owner; the shared queue is consulted only when a
//! worker has no pinned work of its own.
//!
//! Construction blocks until every worker has installed its scheduler, so
//! the pool's worker ids are valid spawn destinations as soon as `new`
//! returns.

use crossbeam_queue::SegQueue;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, OnceLock};
use std::time::Instant;

use crate::config;
use crate::error::{Error, ErrorKind};
use crate::promise::{self, PromiseFuture};

use super::names::set_thread_name;
use super::scheduler::{Blocker, Parker, RunPolicy};
use super::{worker, Fiber, WorkerId};

struct PoolShared {
    queue: SegQueue<Arc<Fiber>>,
    parker: Parker,
    closing: AtomicBool,
}

impl Blocker for PoolShared {
    fn suspend_until(&self, deadline: Option<Instant>) {
        self.parker.suspend_until(deadline);
    }

    fn notify(&self) {
        self.parker.notify();
    }
}

/// Run policy of a pool worker: local pinned FIFO over the shared queue.
struct PoolPolicy {
    pool: Arc<PoolShared>,
    pinned: VecDeque<Arc<Fiber>>,
}

impl RunPolicy for PoolPolicy {
    fn awakened(&mut self, fiber: Arc<Fiber>) {
        if fiber.is_free() {
            self.pool.queue.push(fiber);
            self.pool.parker.notify();
        } else {
            self.pinned.push_back(fiber);
        }
    }

    fn pick_next(&mut self) -> Option<Arc<Fiber>> {
        if let Some(fiber) = self.pinned.pop_front() {
            return Some(fiber);
        }
        self.pool.queue.pop()
    }

    fn has_ready(&self) -> bool {
        !self.pinned.is_empty() || !self.pool.queue.is_empty()
    }

    fn blocker(&self) -> Arc<dyn Blocker> {
        self.pool.clone()
    }
}

/// A fixed-size pool of worker threads for parallel fiber execution.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<WorkerId>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers and waits until all of them are ready.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero.
    #[must_use]
    pub fn new(threads: u16) -> Self {
        assert!(threads > 0, "a worker pool needs at least one thread");
        let shared = Arc::new(PoolShared {
            queue: SegQueue::new(),
            parker: Parker::new(),
            closing: AtomicBool::new(false),
        });
        let barrier = Arc::new(Barrier::new(usize::from(threads) + 1));
        let (tx, rx) = std::sync::mpsc::channel();

        let mut handles = Vec::with_capacity(usize::from(threads));
        for i in 0..threads {
            let pool = shared.clone();
            let barrier = barrier.clone();
            let tx = tx.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("pool-worker-{i}"))
                    .spawn(move || {
                        set_thread_name(format!("pool worker #{i}"));
                        let ws = worker::install(Box::new(PoolPolicy {
                            pool: pool.clone(),
                            pinned: VecDeque::new(),
                        }));
                        tx.send((i, ws.id())).expect("pool constructor is waiting");
                        barrier.wait();
                        worker::run_until(&|| pool.closing.load(Ordering::Acquire));
                        worker::uninstall();
                    })
                    .expect("spawning pool worker thread"),
            );
        }
        drop(tx);

        let mut workers = vec![None; usize::from(threads)];
        for _ in 0..threads {
            let (i, id) = rx.recv().expect("every worker reports its id");
            workers[usize::from(i)] = Some(id);
        }
        barrier.wait();
        tracing::debug!(threads, "worker pool ready");

        Self {
            shared,
            workers: workers.into_iter().map(|w| w.expect("reported")).collect(),
            threads: handles,
        }
    }

    /// Ids of the pool's workers, in construction order. Valid as spawn and
    /// migration destinations.
    #[must_use]
    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    /// Submits a free fiber: it has no home and runs on any idle worker.
    ///
    /// Returns the join future. Posting to a closed pool fails the join
    /// future with [`ErrorKind::Shutdown`].
    pub fn post<F>(&self, future: F) -> PromiseFuture<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (promise, join) = promise::pair();
        if self.shared.closing.load(Ordering::Acquire) {
            promise.fail(Error::with_context(
                ErrorKind::Shutdown,
                "worker pool is closed",
            ));
            return join;
        }
        let body = async move {
            promise.complete(future.await);
        };
        let fiber = Fiber::new(Box::pin(body), true, None);
        self.shared.queue.push(fiber);
        self.shared.parker.notify();
        join
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        self.shared.parker.notify();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        // Fibers never claimed by a worker abandon their join promises.
        while self.shared.queue.pop().is_some() {}
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("closing", &self.shared.closing.load(Ordering::Relaxed))
            .finish()
    }
}

/// The process-wide pool used by [`do_parallel`](crate::do_parallel),
/// sized like the reactor thread pool.
pub(crate) fn global() -> &'static WorkerPool {
    static POOL: OnceLock<WorkerPool> = OnceLock::new();
    POOL.get_or_init(|| WorkerPool::new(config::reactor_threads()))
}
