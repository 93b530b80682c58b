//! Fiber-aware synchronization primitives.
//!
//! Awaiting [`Notify::notified`] is a suspension point: only the calling
//! fiber blocks, its worker keeps running other fibers.

mod notify;

pub use notify::{Notified, Notify};
