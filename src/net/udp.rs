//! Async UDP over the ordered poll service.
//!
//! The socket is non-blocking from creation. Sends and receives attempt
//! the syscall directly and, when the socket is not ready, suspend the
//! calling fiber on a readiness promise from the
//! [`PollService`](crate::reactor::poll_service::PollService). At most one
//! fiber may be receiving and one sending at any time.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::reactor::poll_service::PollService;

use super::ip::AnyEndpoint;

struct UdpInner {
    socket: std::net::UdpSocket,
    closed: AtomicBool,
}

/// An async UDP socket.
pub struct UdpSocket {
    inner: Arc<UdpInner>,
}

impl UdpSocket {
    /// Binds to `endpoint`; non-blocking mode is set once, here.
    pub fn bind(endpoint: AnyEndpoint) -> Result<Self> {
        let addr: SocketAddr = endpoint.into();
        let socket = std::net::UdpSocket::bind(addr).map_err(Error::from)?;
        socket.set_nonblocking(true).map_err(Error::from)?;
        Ok(Self {
            inner: Arc::new(UdpInner {
                socket,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn fd(&self) -> RawFd {
        self.inner.socket.as_raw_fd()
    }

    /// The bound endpoint.
    pub fn local_endpoint(&self) -> Result<AnyEndpoint> {
        let addr = self.inner.socket.local_addr().map_err(Error::from)?;
        Ok(AnyEndpoint::from(addr))
    }

    /// Sends `buf` as one datagram to `dest`.
    pub async fn send_to(&self, buf: Bytes, dest: AnyEndpoint) -> Result<usize> {
        let addr: SocketAddr = dest.into();
        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(Error::with_context(ErrorKind::Cancelled, "socket closed"));
            }
            match self.inner.socket.send_to(&buf, addr) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    PollService::global().want_write(self.fd()).await?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from(e)),
            }
        }
    }

    /// Receives one datagram of at most `max` bytes, appending to `buf`.
    ///
    /// Returns the buffer, the byte count and the sender's endpoint.
    pub async fn receive_from(
        &self,
        buf: BytesMut,
        max: usize,
    ) -> Result<(BytesMut, usize, AnyEndpoint)> {
        let start = buf.len();
        let mut buf = buf;
        buf.resize(start + max, 0);
        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(Error::with_context(ErrorKind::Cancelled, "socket closed"));
            }
            match self.inner.socket.recv_from(&mut buf[start..]) {
                Ok((n, from)) => {
                    buf.truncate(start + n);
                    return Ok((buf, n, AnyEndpoint::from(from)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    PollService::global().want_read(self.fd()).await?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from(e)),
            }
        }
    }

    /// Closes the socket; outstanding readiness waits fail.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            PollService::global().deregister(self.fd());
        }
    }
}

impl Drop for UdpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UdpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpSocket")
            .field("local", &self.local_endpoint().ok())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}
