//! One-shot thread and fiber names.
//!
//! Logging wants a stable, human-meaningful label for "who is running".
//! Threads and fibers each carry a name that may be set exactly once;
//! setting it twice is a programming error and panics. When no name was
//! set, a generated identifier (`thread #N` / `fiber #N`) is returned
//! instead.
//!
//! Code running on a thread outside any fiber (for example a `main` that
//! called [`initialize_fibers`](crate::initialize_fibers)) still has an
//! implicit fiber identity; its name lives in a thread-local slot.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};

use super::worker;

static THREAD_SEQ: AtomicU64 = AtomicU64::new(1);
static IMPLICIT_FIBER_SEQ: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
    static THREAD_NUMBER: Cell<Option<u64>> = const { Cell::new(None) };
    // Name and generated number of the implicit fiber, for code running on
    // a thread but outside any spawned fiber.
    static IMPLICIT_FIBER_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
    static IMPLICIT_FIBER_NUMBER: Cell<Option<u64>> = const { Cell::new(None) };
}

fn thread_number() -> u64 {
    THREAD_NUMBER.with(|cell| match cell.get() {
        Some(n) => n,
        None => {
            let n = THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
            cell.set(Some(n));
            n
        }
    })
}

/// Returns the current thread's name, or a generated `thread #N` label.
#[must_use]
pub fn get_thread_name() -> String {
    THREAD_NAME.with(|name| match &*name.borrow() {
        Some(name) => name.clone(),
        None => format!("thread #{}", thread_number()),
    })
}

/// Names the current thread. One-shot.
///
/// # Panics
///
/// Panics if the thread name was already set.
pub fn set_thread_name(name: impl Into<String>) {
    THREAD_NAME.with(|slot| {
        let mut slot = slot.borrow_mut();
        assert!(slot.is_none(), "thread name already set");
        *slot = Some(name.into());
    });
}

/// Returns the current fiber's name, or a generated `fiber #N` label.
///
/// Outside any fiber this reports the thread's implicit fiber.
#[must_use]
pub fn get_fiber_name() -> String {
    if let Some(fiber) = worker::current_fiber() {
        return match fiber.name_cell().get() {
            Some(name) => name.clone(),
            None => fiber.id().to_string(),
        };
    }
    IMPLICIT_FIBER_NAME.with(|name| match &*name.borrow() {
        Some(name) => name.clone(),
        None => {
            let n = IMPLICIT_FIBER_NUMBER.with(|cell| match cell.get() {
                Some(n) => n,
                None => {
                    let n = IMPLICIT_FIBER_SEQ.fetch_add(1, Ordering::Relaxed);
                    cell.set(Some(n));
                    n
                }
            });
            format!("fiber #{n}")
        }
    })
}

/// Names the current fiber. One-shot; a name given at spawn counts.
///
/// # Panics
///
/// Panics if the fiber name was already set.
pub fn set_fiber_name(name: impl Into<String>) {
    if let Some(fiber) = worker::current_fiber() {
        assert!(
            fiber.name_cell().set(name.into()).is_ok(),
            "fiber name already set"
        );
        return;
    }
    IMPLICIT_FIBER_NAME.with(|slot| {
        let mut slot = slot.borrow_mut();
        assert!(slot.is_none(), "fiber name already set");
        *slot = Some(name.into());
    });
}
