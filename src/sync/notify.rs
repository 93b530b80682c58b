//! Event notification for fibers.
//!
//! [`Notify`] is the fiber analog of a condition variable: fibers await
//! [`notified`](Notify::notified), other code signals them with
//! [`notify_one`](Notify::notify_one) or [`notify_all`](Notify::notify_all).
//! A `notify_one` with no waiter is stored and handed to the next waiter,
//! so the signal-then-wait race is benign.
//!
//! The `Notified` future is cancel-safe: dropping it removes the waiter,
//! and a notification it consumed but never observed is passed on to the
//! next waiter.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct Inner {
    /// Notifications delivered while nobody was waiting.
    permits: usize,
    next_id: u64,
    waiters: Vec<Waiter>,
}

struct Waiter {
    id: u64,
    waker: Option<Waker>,
    notified: bool,
}

/// A one-to-many notification primitive.
#[derive(Default)]
pub struct Notify {
    inner: Mutex<Inner>,
}

impl Notify {
    /// Creates a new `Notify` with no stored notifications.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns a future that completes on the next notification.
    pub fn notified(&self) -> Notified<'_> {
        Notified {
            notify: self,
            state: NotifiedState::Init,
        }
    }

    /// Wakes one waiter, or stores the notification if none is waiting.
    pub fn notify_one(&self) {
        let waker = {
            let mut inner = self.lock();
            match inner.waiters.iter_mut().find(|w| !w.notified) {
                Some(waiter) => {
                    waiter.notified = true;
                    waiter.waker.take()
                }
                None => {
                    inner.permits += 1;
                    None
                }
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Wakes every current waiter. Waiters arriving later are unaffected.
    pub fn notify_all(&self) {
        let wakers: Vec<Waker> = {
            let mut inner = self.lock();
            inner
                .waiters
                .iter_mut()
                .filter(|w| !w.notified)
                .filter_map(|w| {
                    w.notified = true;
                    w.waker.take()
                })
                .collect()
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl std::fmt::Debug for Notify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Notify")
            .field("permits", &inner.permits)
            .field("waiters", &inner.waiters.len())
            .finish()
    }
}

enum NotifiedState {
    Init,
    Waiting(u64),
    Done,
}

/// Future returned by [`Notify::notified`].
pub struct Notified<'a> {
    notify: &'a Notify,
    state: NotifiedState,
}

impl Future for Notified<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        match this.state {
            NotifiedState::Init => {
                let mut inner = this.notify.lock();
                if inner.permits > 0 {
                    inner.permits -= 1;
                    this.state = NotifiedState::Done;
                    return Poll::Ready(());
                }
                let id = inner.next_id;
                inner.next_id += 1;
                inner.waiters.push(Waiter {
                    id,
                    waker: Some(cx.waker().clone()),
                    notified: false,
                });
                this.state = NotifiedState::Waiting(id);
                Poll::Pending
            }
            NotifiedState::Waiting(id) => {
                let mut inner = this.notify.lock();
                let pos = inner
                    .waiters
                    .iter()
                    .position(|w| w.id == id)
                    .expect("waiter registered");
                if inner.waiters[pos].notified {
                    inner.waiters.remove(pos);
                    this.state = NotifiedState::Done;
                    Poll::Ready(())
                } else {
                    inner.waiters[pos].waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
            NotifiedState::Done => Poll::Ready(()),
        }
    }
}

impl Drop for Notified<'_> {
    fn drop(&mut self) {
        if let NotifiedState::Waiting(id) = self.state {
            let waker = {
                let mut inner = self.notify.lock();
                let Some(pos) = inner.waiters.iter().position(|w| w.id == id) else {
                    return;
                };
                let waiter = inner.waiters.remove(pos);
                if !waiter.notified {
                    return;
                }
                // We consumed a notification without observing it; pass it
                // to the next waiter.
                match inner.waiters.iter_mut().find(|w| !w.notified) {
                    Some(next) => {
                        next.notified = true;
                        next.waker.take()
                    }
                    None => {
                        inner.permits += 1;
                        None
                    }
                }
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::worker::block_on;
    use crate::fiber::{spawn, worker};
    use std::sync::Arc;

    #[test]
    fn stored_notification_is_consumed() {
        std::thread::spawn(|| {
            let notify = Notify::new();
            notify.notify_one();
            block_on(notify.notified());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn notify_one_wakes_a_waiting_fiber() {
        std::thread::spawn(|| {
            worker::initialize_fibers();
            let notify = Arc::new(Notify::new());
            let n = notify.clone();
            let join = spawn(async move {
                n.notified().await;
                "woken"
            });
            notify.notify_one();
            assert_eq!(block_on(join).unwrap(), "woken");
        })
        .join()
        .unwrap();
    }

    #[test]
    fn notify_all_wakes_every_waiter() {
        std::thread::spawn(|| {
            worker::initialize_fibers();
            let notify = Arc::new(Notify::new());
            let joins: Vec<_> = (0..3)
                .map(|_| {
                    let n = notify.clone();
                    spawn(async move { n.notified().await })
                })
                .collect();
            // Let all three fibers reach their wait before signalling.
            block_on(crate::fiber::timer::yield_now());
            notify.notify_all();
            for join in joins {
                block_on(join).unwrap();
            }
        })
        .join()
        .unwrap();
    }
}
