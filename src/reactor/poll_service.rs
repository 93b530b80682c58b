//! Ordered readiness service for datagram-style sockets.
//!
//! A dedicated service thread hosts an ordered poll over registered socket
//! ids. Per socket, at most one read promise and one write promise may be
//! outstanding; when the poller reports readiness the matching promise is
//! completed and removed. Deregistering a socket removes its entries and
//! fails any outstanding promises with a generic I/O error.
//!
//! This is the awaitability layer for sockets that do not go through the
//! main reactor's operation table; the UDP wrapper drives its readiness
//! waits through here.

use parking_lot::Mutex;
use polling::{Event, Poller};
use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::fiber::names::set_thread_name;
use crate::promise::{self, Promise, PromiseFuture};

const POLL_TICK: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Slot {
    read: Option<Promise<()>>,
    write: Option<Promise<()>>,
    added: bool,
}

/// Readiness promises over an ordered socket table.
pub(crate) struct PollService {
    poller: Poller,
    // Ordered by socket id; events are handled in id order as well.
    slots: Mutex<BTreeMap<usize, Slot>>,
}

impl PollService {
    /// Starts the service and its thread.
    pub(crate) fn start() -> std::io::Result<Arc<Self>> {
        let service = Arc::new(Self {
            poller: Poller::new()?,
            slots: Mutex::new(BTreeMap::new()),
        });
        let runner = service.clone();
        std::thread::Builder::new()
            .name("poll-service".into())
            .spawn(move || {
                set_thread_name("poll service");
                runner.run();
            })?;
        Ok(service)
    }

    /// The process-wide service, started on first use.
    pub(crate) fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<Arc<PollService>> = OnceLock::new();
        GLOBAL.get_or_init(|| PollService::start().expect("starting the poll service"))
    }

    /// A future that resolves when `fd` becomes readable.
    ///
    /// # Panics
    ///
    /// Panics if a read waiter is already registered for `fd`; at most one
    /// per direction per socket.
    pub(crate) fn want_read(&self, fd: RawFd) -> PromiseFuture<()> {
        self.want(fd, true)
    }

    /// A future that resolves when `fd` becomes writable.
    ///
    /// # Panics
    ///
    /// Panics if a write waiter is already registered for `fd`.
    pub(crate) fn want_write(&self, fd: RawFd) -> PromiseFuture<()> {
        self.want(fd, false)
    }

    fn want(&self, fd: RawFd, read: bool) -> PromiseFuture<()> {
        let (promise, future) = promise::pair();
        let mut slots = self.slots.lock();
        let slot = slots.entry(fd as usize).or_default();
        let cell = if read { &mut slot.read } else { &mut slot.write };
        assert!(
            cell.is_none(),
            "socket already has a {} waiter",
            if read { "read" } else { "write" }
        );
        *cell = Some(promise);
        self.arm_locked(fd as usize, slots);
        future
    }

    /// Removes `fd` from the table, failing its outstanding promises.
    pub(crate) fn deregister(&self, fd: RawFd) {
        let slot = self.slots.lock().remove(&(fd as usize));
        let Some(slot) = slot else { return };
        if slot.added {
            let _ = self.poller.delete(fd);
        }
        let err = Error::with_context(ErrorKind::Io, "socket closed while polled");
        if let Some(promise) = slot.read {
            promise.fail(err.clone());
        }
        if let Some(promise) = slot.write {
            promise.fail(err);
        }
    }

    fn arm_locked(
        &self,
        key: usize,
        mut slots: parking_lot::MutexGuard<'_, BTreeMap<usize, Slot>>,
    ) {
        let Some(slot) = slots.get_mut(&key) else { return };
        let interest = match (slot.read.is_some(), slot.write.is_some()) {
            (true, true) => Event::all(key),
            (true, false) => Event::readable(key),
            (false, true) => Event::writable(key),
            (false, false) => Event::none(key),
        };
        let result = if slot.added {
            self.poller.modify(key as RawFd, interest)
        } else {
            match self.poller.add(key as RawFd, interest) {
                Ok(()) => {
                    slot.added = true;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            tracing::error!(key, error = %e, "arming poll service failed");
            let slot = slots.remove(&key).expect("slot present");
            drop(slots);
            let err = Error::from(e);
            if let Some(promise) = slot.read {
                promise.fail(err.clone());
            }
            if let Some(promise) = slot.write {
                promise.fail(err);
            }
        }
    }

    fn run(self: Arc<Self>) {
        let mut events = Vec::with_capacity(16);
        loop {
            events.clear();
            match self.poller.wait(&mut events, Some(POLL_TICK)) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!(error = %e, "poll service wait failed");
                }
            }
            // Ordered poll: deliver completions in socket-id order.
            events.sort_by_key(|event| event.key);
            for event in &events {
                let (read, write) = {
                    let mut slots = self.slots.lock();
                    let Some(slot) = slots.get_mut(&event.key) else {
                        continue;
                    };
                    let read = if event.readable {
                        slot.read.take()
                    } else {
                        None
                    };
                    let write = if event.writable {
                        slot.write.take()
                    } else {
                        None
                    };
                    (read, write)
                };
                if let Some(promise) = read {
                    promise.complete(());
                }
                if let Some(promise) = write {
                    promise.complete(());
                }
                let slots = self.slots.lock();
                self.arm_locked(event.key, slots);
            }
        }
    }
}

impl std::fmt::Debug for PollService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollService")
            .field("sockets", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::WaitStatus;

    #[test]
    fn deregister_fails_outstanding_promises() {
        let service = PollService::start().unwrap();
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&socket);

        let pending = service.want_read(fd);
        assert_eq!(pending.wait_for(Duration::ZERO), WaitStatus::Timeout);
        service.deregister(fd);
        let err = pending.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn writable_udp_socket_completes_promptly() {
        let service = PollService::start().unwrap();
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&socket);

        // A fresh UDP socket is writable immediately.
        service.want_write(fd).wait().unwrap();
        service.deregister(fd);
    }
}
