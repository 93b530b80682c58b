//! The serial valve: pipelined two-phase execution with ordered commits.
//!
//! A task submitted to a [`SerialValve`] runs in two phases. Phase one may
//! run concurrently with anything; phase two runs in strict submission
//! order: no second phase begins before the previous submission's second
//! phase has returned.
//!
//! The valve holds a single atomic *tail latch*: the promise whose future
//! signals the end of the youngest in-flight commit. Drawing a ticket swaps
//! a fresh latch into the tail (a compare-and-exchange loop; phase one
//! never runs inside a critical section) and keeps the previous latch as
//! the ticket's *turn*. The initial latch is pre-completed, so the
//! first submission commits as soon as its phase one finishes.

use arc_swap::ArcSwapOption;
use std::future::Future;
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::promise::{self, Promise, PromiseFuture, Shared};

/// Order-preserving pipelined commit primitive.
pub struct SerialValve {
    tail: ArcSwapOption<Shared<()>>,
}

impl SerialValve {
    /// Creates an open valve whose first ticket commits immediately after
    /// its first phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tail: ArcSwapOption::from(Some(Shared::ready(()))),
        }
    }

    /// Runs `first` concurrently, then `second` in submission order.
    ///
    /// Returns `second`'s output once both phases have committed. If
    /// `first` fails, `second` is skipped; the ticket still waits for its
    /// turn before releasing the next submission, so commit order is
    /// preserved for everyone else. If the returned future is dropped
    /// mid-flight, the release latch is completed regardless, so the chain
    /// never deadlocks.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Shutdown`] when the valve has been closed,
    /// and propagates errors from either phase.
    pub async fn do_serial<A, B, U>(&self, first: A, second: B) -> Result<U>
    where
        A: Future<Output = Result<()>>,
        B: Future<Output = Result<U>>,
    {
        let mut ticket = Ticket::draw(&self.tail)?;
        match first.await {
            Ok(()) => {}
            Err(err) => {
                // Skip the commit but keep our place in line; a successor
                // must not overtake the still-running predecessor.
                let _ = ticket.turn().await;
                return Err(err);
            }
        }
        ticket.turn().await?;
        let out = second.await;
        drop(ticket);
        out
    }

    /// Shuts the valve: subsequent submissions fail with
    /// [`ErrorKind::Shutdown`]. Returns the final latch future, ready once
    /// every in-flight ticket has released; `None` if already closed.
    pub fn close(&self) -> Option<PromiseFuture<()>> {
        self.tail.swap(None).map(PromiseFuture::from_shared)
    }

    /// Closes the valve and waits for in-flight tickets to drain.
    pub async fn shutdown(&self) {
        if let Some(last) = self.close() {
            let _ = last.await;
        }
    }
}

impl Default for SerialValve {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialValve {
    fn drop(&mut self) {
        if let Some(last) = self.tail.swap(None) {
            if !last.is_settled() {
                tracing::debug!("serial valve dropped with tickets still in flight");
            }
        }
    }
}

impl std::fmt::Debug for SerialValve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialValve")
            .field("open", &self.tail.load().is_some())
            .finish()
    }
}

/// One submission's place in the commit chain. Dropping it always
/// completes the release latch.
struct Ticket {
    mine: Option<Promise<()>>,
    turn: Option<PromiseFuture<()>>,
}

fn same_tail(a: &Option<Arc<Shared<()>>>, b: &Option<Arc<Shared<()>>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl Ticket {
    fn draw(tail: &ArcSwapOption<Shared<()>>) -> Result<Self> {
        let (promise, _) = promise::pair();
        let fresh = promise.shared();
        let mut cur = tail.load();
        loop {
            let Some(prev) = (*cur).clone() else {
                return Err(Error::with_context(
                    ErrorKind::Shutdown,
                    "serial valve is shutting down",
                ));
            };
            let witnessed = tail.compare_and_swap(&*cur, Some(fresh.clone()));
            if same_tail(&witnessed, &cur) {
                return Ok(Self {
                    mine: Some(promise),
                    turn: Some(PromiseFuture::from_shared(prev)),
                });
            }
            cur = witnessed;
        }
    }

    async fn turn(&mut self) -> Result<()> {
        match self.turn.take() {
            Some(turn) => turn.await,
            None => Ok(()),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(mine) = self.mine.take() {
            mine.complete(());
        }
    }
}
