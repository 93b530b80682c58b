//! Process-wide runtime configuration.
//!
//! There is exactly one knob: the number of reactor threads. It may be set
//! once, before the reactor first starts; the worker pool is sized from the
//! same value. An environment variable (`FILAMENT_REACTOR_THREADS`) can
//! provide the value when the host application does not call
//! [`set_reactor_threads`] itself.

use std::sync::atomic::{AtomicU32, Ordering};

/// Environment variable consulted when no explicit thread count was set.
pub const REACTOR_THREADS_ENV: &str = "FILAMENT_REACTOR_THREADS";

// 0 = unset. Once resolved (explicitly or on first reactor use) the value
// never changes.
static REACTOR_THREADS: AtomicU32 = AtomicU32::new(0);

/// Sets the number of reactor threads.
///
/// Must be called at most once, before the reactor is first used.
///
/// # Panics
///
/// Panics if `count` is zero, or if the thread count has already been set
/// (explicitly or implicitly by first reactor use). Setting it twice is a
/// programming error.
pub fn set_reactor_threads(count: u16) {
    assert!(count > 0, "reactor thread count must be non-zero");
    let prev = REACTOR_THREADS.compare_exchange(
        0,
        u32::from(count),
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
    assert!(
        prev.is_ok(),
        "reactor thread count already set to {}",
        prev.unwrap_err()
    );
}

/// Returns the configured reactor thread count, resolving and locking in the
/// default on first use.
///
/// Resolution order: explicit [`set_reactor_threads`] call, then the
/// `FILAMENT_REACTOR_THREADS` environment variable, then
/// `max(available_parallelism, 8)`.
pub(crate) fn reactor_threads() -> u16 {
    let current = REACTOR_THREADS.load(Ordering::SeqCst);
    if current != 0 {
        return current as u16;
    }
    let resolved = from_env().unwrap_or_else(default_threads);
    match REACTOR_THREADS.compare_exchange(
        0,
        u32::from(resolved),
        Ordering::SeqCst,
        Ordering::SeqCst,
    ) {
        Ok(_) => resolved,
        // Lost the race; someone else resolved first.
        Err(other) => other as u16,
    }
}

fn from_env() -> Option<u16> {
    let raw = std::env::var(REACTOR_THREADS_ENV).ok()?;
    match raw.trim().parse::<u16>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(value = %raw, "ignoring unparseable {REACTOR_THREADS_ENV}");
            None
        }
    }
}

fn default_threads() -> u16 {
    let hw = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    hw.max(8).min(u16::MAX as usize) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_at_least_eight() {
        assert!(default_threads() >= 8);
    }

    // The set-once behavior is global process state; exercising the
    // double-set panic would poison every other test in this binary, so it
    // is covered by the resolution logic tests only.
    #[test]
    fn resolved_value_is_stable() {
        let first = reactor_threads();
        let second = reactor_threads();
        assert_eq!(first, second);
    }
}
