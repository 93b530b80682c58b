//! I/O operation records.
//!
//! A submission to the reactor is a record owning everything the operation
//! needs to finish without its submitter: the nonblocking syscall attempt
//! (which captures the socket handle and the buffer share) and the promise
//! it resolves. The record lives in the reactor's per-descriptor table
//! until the attempt completes, and is failed in place when the descriptor
//! is deregistered.

use crate::error::{Error, Result};
use crate::promise::Promise;

/// Which readiness an operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// Outcome of one nonblocking attempt.
pub(crate) enum OpPoll<T> {
    /// The syscall finished; the promise gets this result.
    Ready(Result<T>),
    /// The descriptor was not ready; arm the poller and retry on the event.
    WouldBlock,
}

/// A stored operation the reactor can re-attempt and fail.
pub(crate) trait IoStep: Send {
    /// Runs the attempt. Returns true once the promise has been resolved.
    fn attempt(&mut self) -> bool;
    /// Fails the operation without attempting it again.
    fn cancel(&mut self, err: Error);
}

/// The one concrete step: a retryable closure plus the completion promise.
pub(crate) struct ReadinessOp<T, F> {
    attempt: F,
    promise: Option<Promise<T>>,
}

impl<T, F> ReadinessOp<T, F>
where
    F: FnMut() -> OpPoll<T> + Send,
    T: Send,
{
    pub(crate) fn new(attempt: F, promise: Promise<T>) -> Self {
        Self {
            attempt,
            promise: Some(promise),
        }
    }
}

impl<T, F> IoStep for ReadinessOp<T, F>
where
    F: FnMut() -> OpPoll<T> + Send,
    T: Send,
{
    fn attempt(&mut self) -> bool {
        if self.promise.is_none() {
            return true;
        }
        match (self.attempt)() {
            OpPoll::Ready(result) => {
                if let Some(promise) = self.promise.take() {
                    promise.complete_result(result);
                }
                true
            }
            OpPoll::WouldBlock => false,
        }
    }

    fn cancel(&mut self, err: Error) {
        if let Some(promise) = self.promise.take() {
            promise.fail(err);
        }
    }
}
