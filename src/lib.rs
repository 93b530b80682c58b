//! Filament: a cooperative fiber runtime with cross-thread migration, a
//! reactor-bridged I/O layer, and an order-preserving serial valve.
//!
//! # Overview
//!
//! Filament multiplexes many lightweight cooperative tasks ("fibers") onto
//! a fixed set of worker threads. Any fiber can be pinned to a specific
//! worker or moved to another one mid-flight; socket I/O suspends only the
//! calling fiber; and the [`SerialValve`] lets pipelined work run its
//! parallel phase concurrently while committing in strict submission
//! order.
//!
//! # Core guarantees
//!
//! - **Cooperative only**: fibers yield at explicit suspension points
//!   (awaiting a promise, sleeping, yielding, waiting on a
//!   [`sync::Notify`]); there is no preemption.
//! - **Single-owner scheduling**: each worker's run queue is touched only
//!   by its own thread; cross-thread handoff goes through a lock-free
//!   intake queue.
//! - **Migration preserves identity**: a fiber moved between workers keeps
//!   its id, its name and its suspended state.
//! - **Ordered commits**: for any two valve submissions in program order,
//!   the earlier one's second phase completes before the later one's
//!   begins.
//! - **Cancellation by closing**: closing a socket fails its pending
//!   operations at the awaiting fiber's suspension point.
//!
//! # Module structure
//!
//! - [`fiber`]: fibers, schedulers, the dispatcher, the worker pool
//! - [`promise`]: single-shot completion cells
//! - [`valve`]: the serial valve
//! - [`net`]: address types, TCP/UDP wrappers, the resolver
//! - [`sync`]: fiber-aware notification
//! - [`config`]: the one process-wide knob (reactor thread count)
//! - [`error`]: the crate-wide error type
//!
//! # Example
//!
//! ```no_run
//! use filament::{do_parallel, initialize_fibers, spawn};
//!
//! initialize_fibers();
//! let local = spawn(async { filament::get_fiber_name() });
//! let pooled = do_parallel(async { 6 * 7 });
//! assert_eq!(pooled.wait().unwrap(), 42);
//! println!("{}", local.wait().unwrap());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

pub mod config;
pub mod error;
pub mod fiber;
pub mod net;
pub mod promise;
pub(crate) mod reactor;
pub mod sync;
pub mod valve;

pub use config::set_reactor_threads;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use fiber::{
    block_on, current_worker_id, do_parallel, get_fiber_name, get_thread_name, initialize_fibers,
    migrate_to, schedule_at, set_fiber_destination, set_fiber_name, set_thread_name, sleep,
    sleep_until, spawn, spawn_with, yield_now, FiberId, SpawnOptions, WorkerId, WorkerPool,
};
pub use promise::{pair, Promise, PromiseFuture, WaitStatus};
pub use valve::SerialValve;
