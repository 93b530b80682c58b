//! Spawning: `spawn`, `schedule_at`, `do_parallel` and explicit migration.
//!
//! Every spawn creates a fiber wrapping the user future together with the
//! promise that becomes its join future. A destination worker, a name and
//! a not-before deadline can be given through [`SpawnOptions`]; the plain
//! helpers cover the common cases.

use std::future::Future;
use std::time::Instant;

use crate::promise::{self, PromiseFuture};

use super::{dispatcher, pool, timer, worker, Fiber, WorkerId};

/// Options for [`spawn_with`]: destination worker, fiber name, earliest
/// start time.
#[derive(Debug, Default)]
pub struct SpawnOptions {
    dest: Option<WorkerId>,
    name: Option<String>,
    at: Option<Instant>,
}

impl SpawnOptions {
    /// No destination (current worker), no name, start immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the fiber to `dest` instead of the current worker.
    #[must_use]
    pub fn on(mut self, dest: WorkerId) -> Self {
        self.dest = Some(dest);
        self
    }

    /// Name the fiber; counts as its one-shot name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Delay the body until `deadline`. A past deadline runs promptly.
    #[must_use]
    pub fn at(mut self, deadline: Instant) -> Self {
        self.at = Some(deadline);
        self
    }
}

/// Spawns a fiber according to `options` and returns its join future.
///
/// The join future resolves with the body's output, or with an error if
/// the fiber terminated abnormally.
///
/// # Panics
///
/// Panics if no destination is given and the current thread hosts no
/// scheduler, or if the destination worker is not registered.
pub fn spawn_with<F>(options: SpawnOptions, future: F) -> PromiseFuture<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (promise, join) = promise::pair();
    let at = options.at;
    let body = async move {
        if let Some(deadline) = at {
            timer::sleep_until(deadline).await;
        }
        promise.complete(future.await);
    };
    let fiber = Fiber::new(Box::pin(body), false, options.name);
    tracing::trace!(fiber = %fiber.id(), dest = ?options.dest, "fiber spawned");
    match options.dest {
        Some(dest) => dispatcher::deliver_to(dest, fiber),
        None => worker::submit_local(fiber),
    }
    join
}

/// Spawns a fiber on the current worker.
pub fn spawn<F>(future: F) -> PromiseFuture<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_with(SpawnOptions::new(), future)
}

/// Spawns a fiber on the current worker, gated on `deadline`.
pub fn schedule_at<F>(deadline: Instant, future: F) -> PromiseFuture<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_with(SpawnOptions::new().at(deadline), future)
}

/// Submits a free fiber to the shared worker pool; any idle pool worker
/// runs it.
pub fn do_parallel<F>(future: F) -> PromiseFuture<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    pool::global().post(future)
}

/// Moves the current fiber to `dest`.
///
/// Registers the destination with the dispatcher and yields; the fiber
/// resumes on the target worker. Migrating to the current worker is a
/// no-op.
///
/// # Panics
///
/// Panics if called outside a fiber, or if `dest` is not a registered
/// worker.
pub async fn migrate_to(dest: WorkerId) {
    let fiber =
        worker::current_fiber().expect("migrate_to must be called from inside a fiber");
    if worker::current_worker() == Some(dest) {
        return;
    }
    dispatcher::set_fiber_destination(fiber.id(), dest);
    timer::yield_now().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::worker::{block_on, current_worker_id, initialize_fibers};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn spawn_runs_on_current_worker() {
        std::thread::spawn(|| {
            initialize_fibers();
            let here = current_worker_id();
            let join = spawn(async move { current_worker_id() });
            assert_eq!(block_on(join).unwrap(), here);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn join_future_carries_output() {
        std::thread::spawn(|| {
            initialize_fibers();
            let join = spawn(async { String::from("output") });
            assert_eq!(block_on(join).unwrap(), "output");
        })
        .join()
        .unwrap();
    }

    #[test]
    fn panicking_fiber_fails_its_join_future() {
        std::thread::spawn(|| {
            initialize_fibers();
            let join = spawn(async { panic!("kaboom") });
            assert!(block_on(join).unwrap_err().is_cancelled());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn schedule_at_past_deadline_runs_promptly() {
        std::thread::spawn(|| {
            initialize_fibers();
            let start = Instant::now();
            let join = schedule_at(start - Duration::from_secs(5), async { 1 });
            assert_eq!(block_on(join).unwrap(), 1);
            assert!(start.elapsed() < Duration::from_secs(1));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn schedule_at_waits_for_the_deadline() {
        std::thread::spawn(|| {
            initialize_fibers();
            let start = Instant::now();
            let join = schedule_at(start + Duration::from_millis(40), async { 1 });
            assert_eq!(block_on(join).unwrap(), 1);
            assert!(start.elapsed() >= Duration::from_millis(35));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn spawned_fibers_interleave_fifo() {
        std::thread::spawn(|| {
            initialize_fibers();
            let counter = Arc::new(AtomicU32::new(0));
            let (c1, c2) = (counter.clone(), counter.clone());
            let first = spawn(async move {
                assert_eq!(c1.fetch_add(1, Ordering::SeqCst), 0);
                timer::yield_now().await;
                assert_eq!(c1.fetch_add(1, Ordering::SeqCst), 2);
            });
            let second = spawn(async move {
                assert_eq!(c2.fetch_add(1, Ordering::SeqCst), 1);
                timer::yield_now().await;
                assert_eq!(c2.fetch_add(1, Ordering::SeqCst), 3);
            });
            block_on(first).unwrap();
            block_on(second).unwrap();
        })
        .join()
        .unwrap();
    }
}
