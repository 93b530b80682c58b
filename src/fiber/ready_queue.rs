//! Lock-free intake queue for externally-awakened fibers.
//!
//! Every worker owns one [`ReadyQueue`]. Producers on any thread push fiber
//! handles; only the owning worker drains, folding the fibers into its run
//! policy at the start of each pick. This is what lets a source worker hand
//! a fiber to a target worker without ever touching the target's run queue.

use crossbeam_queue::SegQueue;
use std::sync::Arc;

use super::Fiber;

/// Multi-producer single-consumer intake of ready fibers.
#[derive(Default)]
pub(crate) struct ReadyQueue {
    inner: SegQueue<Arc<Fiber>>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes a fiber handle. Callable from any thread.
    pub(crate) fn push(&self, fiber: Arc<Fiber>) {
        self.inner.push(fiber);
    }

    /// Drains everything currently queued into `f`. Only the owning worker
    /// calls this.
    pub(crate) fn drain(&self, mut f: impl FnMut(Arc<Fiber>)) {
        while let Some(fiber) = self.inner.pop() {
            f(fiber);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("len", &self.inner.len())
            .finish()
    }
}
