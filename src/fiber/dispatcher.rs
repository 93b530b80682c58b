//! Process-wide dispatcher: worker registry and pending migrations.
//!
//! The dispatcher is the single point of truth for "which worker hosts
//! which scheduler" and "which fiber has been asked to move where". Both
//! maps live behind one mutex; the critical sections are a handful of map
//! operations, so simplicity wins over sharding.
//!
//! A scheduler is registered from construction until drop, always from its
//! own worker thread. Registering a worker id twice, delisting an unknown
//! one, or naming an unknown worker as a migration target are programming
//! errors and panic.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::scheduler::WorkerShared;
use super::{Fiber, FiberId, WorkerId};

struct Registry {
    workers: HashMap<WorkerId, Arc<WorkerShared>>,
    migrations: HashMap<FiberId, WorkerId>,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            workers: HashMap::new(),
            migrations: HashMap::new(),
        })
    })
}

pub(crate) fn enlist(shared: Arc<WorkerShared>) {
    let mut reg = registry().lock();
    let prev = reg.workers.insert(shared.id(), shared);
    assert!(prev.is_none(), "worker enlisted twice");
}

pub(crate) fn delist(id: WorkerId) {
    let mut reg = registry().lock();
    assert!(
        reg.workers.remove(&id).is_some(),
        "delisting a worker that was never enlisted"
    );
    // Migration entries pointing at the departed worker resolve to "stay
    // put" at handoff time; no sweep needed here.
}

#[cfg(test)]
pub(crate) fn is_enlisted(id: WorkerId) -> bool {
    registry().lock().workers.contains_key(&id)
}

/// Records a pending migration: the next time `fiber` is awakened or
/// picked, its scheduler hands it to `dest`.
///
/// # Panics
///
/// Panics if `dest` is not a registered worker; asking to migrate to an
/// unknown worker is a programming error.
pub fn set_fiber_destination(fiber: FiberId, dest: WorkerId) {
    let mut reg = registry().lock();
    assert!(
        reg.workers.contains_key(&dest),
        "migration target {dest} is not a registered worker"
    );
    reg.migrations.insert(fiber, dest);
}

/// Atomically reads and clears any pending migration for `fiber`.
///
/// Returns true if the fiber was handed to another worker (the caller must
/// not enqueue it locally). A destination equal to `current`, or one whose
/// worker has since exited, clears the entry and leaves the fiber where it
/// is.
pub(crate) fn check_migrate(current: WorkerId, fiber: &Arc<Fiber>) -> bool {
    let target = {
        let mut reg = registry().lock();
        let Some(dest) = reg.migrations.remove(&fiber.id()) else {
            return false;
        };
        if dest == current {
            return false;
        }
        match reg.workers.get(&dest) {
            Some(target) => target.clone(),
            None => {
                tracing::debug!(fiber = %fiber.id(), %dest, "migration target gone, fiber stays");
                return false;
            }
        }
    };
    tracing::trace!(fiber = %fiber.id(), from = %current, to = %target.id(), "fiber migrating");
    target.add_fiber(fiber.clone());
    true
}

/// Enqueues a freshly spawned fiber on `dest`.
///
/// # Panics
///
/// Panics if `dest` is not a registered worker.
pub(crate) fn deliver_to(dest: WorkerId, fiber: Arc<Fiber>) {
    let target = {
        let reg = registry().lock();
        reg.workers
            .get(&dest)
            .unwrap_or_else(|| panic!("spawn destination {dest} is not a registered worker"))
            .clone()
    };
    target.add_fiber(fiber);
}

/// Routes an awakened fiber back to its home worker from a foreign thread.
///
/// If the home worker has exited, the fiber is dropped; its join promise
/// reports abandonment.
pub(crate) fn deliver_home(fiber: Arc<Fiber>) {
    let Some(home) = fiber.home() else {
        tracing::error!(fiber = %fiber.id(), "awakened fiber has no home worker; dropping");
        return;
    };
    let target = {
        let reg = registry().lock();
        reg.workers.get(&home).cloned()
    };
    match target {
        Some(target) if target.is_live() => target.add_fiber(fiber),
        _ => {
            tracing::error!(fiber = %fiber.id(), %home, "home worker exited; dropping fiber");
        }
    }
}
