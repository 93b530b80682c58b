//! Async TCP over the reactor bridge.
//!
//! Streams and listeners are set non-blocking exactly once at creation;
//! every operation performs its syscall attempt and suspends the calling
//! fiber on the reactor when the socket is not ready. At most one read-side
//! and one write-side operation may be in flight per socket.
//!
//! Reads and writes are completion-style over owned buffer shares: a write
//! takes [`Bytes`] (cheaply cloneable, shared), a read takes a [`BytesMut`]
//! it appends to and returns. The operation record owns its share until
//! completion, so a submitter unwinding on a cancellation path can never
//! invalidate a buffer the reactor still touches.
//!
//! Closing a socket cancels: pending operations fail with `Cancelled`,
//! the peer observes an orderly shutdown.

use bytes::{Buf, Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::reactor::op::{Direction, OpPoll};
use crate::reactor::Reactor;

use super::ip::AnyEndpoint;

fn domain_for(addr: &SocketAddr) -> Domain {
    match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    }
}

fn is_in_progress(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
        || err.kind() == std::io::ErrorKind::WouldBlock
}

fn closed_error(what: &str) -> Error {
    Error::with_context(ErrorKind::Cancelled, format!("{what} closed"))
}

struct StreamInner {
    socket: Socket,
    closed: AtomicBool,
}

impl StreamInner {
    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// An async TCP stream.
pub struct TcpStream {
    io: Arc<StreamInner>,
}

impl TcpStream {
    fn from_socket(socket: Socket) -> Self {
        Self {
            io: Arc::new(StreamInner {
                socket,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connects to `endpoint`, suspending the calling fiber until the
    /// handshake finishes.
    pub async fn connect(endpoint: AnyEndpoint) -> Result<Self> {
        let addr: SocketAddr = endpoint.into();
        let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(Error::from)?;
        // Non-blocking mode is set once, here; every later operation
        // assumes it.
        socket.set_nonblocking(true).map_err(Error::from)?;

        match socket.connect(&addr.into()) {
            Ok(()) => return Ok(Self::from_socket(socket)),
            Err(e) if is_in_progress(&e) => {}
            Err(e) => return Err(Error::from(e)),
        }

        let stream = Self::from_socket(socket);
        let inner = stream.io.clone();
        let fd = stream.io.fd();
        Reactor::global()
            .submit(fd, Direction::Write, move || {
                if inner.is_closed() {
                    return OpPoll::Ready(Err(closed_error("stream")));
                }
                match inner.socket.take_error() {
                    Ok(Some(err)) => return OpPoll::Ready(Err(Error::from(err))),
                    Ok(None) => {}
                    Err(err) => return OpPoll::Ready(Err(Error::from(err))),
                }
                match inner.socket.peer_addr() {
                    Ok(_) => OpPoll::Ready(Ok(())),
                    Err(e) if e.kind() == std::io::ErrorKind::NotConnected => OpPoll::WouldBlock,
                    Err(e) => OpPoll::Ready(Err(Error::from(e))),
                }
            })
            .await?;
        Ok(stream)
    }

    /// The local endpoint.
    pub fn local_endpoint(&self) -> Result<AnyEndpoint> {
        let addr = self.io.socket.local_addr().map_err(Error::from)?;
        sockaddr_to_endpoint(addr)
    }

    /// The peer endpoint.
    pub fn peer_endpoint(&self) -> Result<AnyEndpoint> {
        let addr = self.io.socket.peer_addr().map_err(Error::from)?;
        sockaddr_to_endpoint(addr)
    }

    /// Reads at least one byte, at most `max`, appending to `buf`.
    ///
    /// Returns the buffer and the byte count. An orderly close by the peer
    /// surfaces as [`ErrorKind::Eof`].
    pub async fn read_some(&self, buf: BytesMut, max: usize) -> Result<(BytesMut, usize)> {
        if max == 0 {
            return Ok((buf, 0));
        }
        let inner = self.io.clone();
        let fd = self.io.fd();
        let start = buf.len();
        let mut slot = Some({
            let mut buf = buf;
            buf.resize(start + max, 0);
            buf
        });
        Reactor::global()
            .submit(fd, Direction::Read, move || {
                if inner.is_closed() {
                    return OpPoll::Ready(Err(closed_error("stream")));
                }
                loop {
                    let read = {
                        let buf = slot.as_mut().expect("buffer share present");
                        (&inner.socket).read(&mut buf[start..])
                    };
                    match read {
                        Ok(0) => {
                            return OpPoll::Ready(Err(Error::with_context(
                                ErrorKind::Eof,
                                "connection closed by peer",
                            )))
                        }
                        Ok(n) => {
                            let mut buf = slot.take().expect("buffer share present");
                            buf.truncate(start + n);
                            return OpPoll::Ready(Ok((buf, n)));
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            return OpPoll::WouldBlock
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => return OpPoll::Ready(Err(Error::from(e))),
                    }
                }
            })
            .await
    }

    /// Reads exactly `len` bytes, appending to `buf`.
    pub async fn read_exact(&self, buf: BytesMut, len: usize) -> Result<BytesMut> {
        let mut buf = buf;
        let mut remaining = len;
        while remaining > 0 {
            let (filled, n) = self.read_some(buf, remaining).await?;
            buf = filled;
            remaining -= n;
        }
        Ok(buf)
    }

    /// Writes some prefix of `buf`, returning the byte count.
    pub async fn write_some(&self, buf: Bytes) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let inner = self.io.clone();
        let fd = self.io.fd();
        Reactor::global()
            .submit(fd, Direction::Write, move || {
                if inner.is_closed() {
                    return OpPoll::Ready(Err(closed_error("stream")));
                }
                loop {
                    match (&inner.socket).write(&buf) {
                        Ok(0) => {
                            return OpPoll::Ready(Err(Error::with_context(
                                ErrorKind::Io,
                                "write returned zero",
                            )))
                        }
                        Ok(n) => return OpPoll::Ready(Ok(n)),
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            return OpPoll::WouldBlock
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => return OpPoll::Ready(Err(Error::from(e))),
                    }
                }
            })
            .await
    }

    /// Writes all of `buf`.
    pub async fn write_all(&self, buf: Bytes) -> Result<()> {
        let mut buf = buf;
        while !buf.is_empty() {
            let n = self.write_some(buf.clone()).await?;
            buf.advance(n);
        }
        Ok(())
    }

    /// Closes the stream. Pending operations fail with `Cancelled`; the
    /// peer sees an orderly shutdown.
    pub fn close(&self) {
        if !self.io.closed.swap(true, Ordering::AcqRel) {
            Reactor::global().deregister(self.io.fd());
            let _ = self.io.socket.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TcpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpStream")
            .field("local", &self.local_endpoint().ok())
            .field("peer", &self.peer_endpoint().ok())
            .field("closed", &self.io.is_closed())
            .finish()
    }
}

struct ListenerInner {
    socket: Socket,
    closed: AtomicBool,
}

/// An async TCP listener.
pub struct TcpListener {
    io: Arc<ListenerInner>,
}

impl TcpListener {
    /// Binds and listens on `endpoint` (non-blocking, address reuse on).
    pub fn bind(endpoint: AnyEndpoint) -> Result<Self> {
        let addr: SocketAddr = endpoint.into();
        let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(Error::from)?;
        socket.set_reuse_address(true).map_err(Error::from)?;
        socket.set_nonblocking(true).map_err(Error::from)?;
        socket.bind(&addr.into()).map_err(Error::from)?;
        socket.listen(1024).map_err(Error::from)?;
        Ok(Self {
            io: Arc::new(ListenerInner {
                socket,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The bound endpoint (useful after binding port 0).
    pub fn local_endpoint(&self) -> Result<AnyEndpoint> {
        let addr = self.io.socket.local_addr().map_err(Error::from)?;
        sockaddr_to_endpoint(addr)
    }

    /// Accepts one connection, suspending the calling fiber until a peer
    /// arrives. The accepted stream is non-blocking from the start.
    ///
    /// Closing the listener, even with an accept in flight, fails the
    /// accept with `Cancelled`.
    pub async fn accept(&self) -> Result<(TcpStream, AnyEndpoint)> {
        let inner = self.io.clone();
        let fd = self.io.socket.as_raw_fd();
        let (socket, peer) = Reactor::global()
            .submit(fd, Direction::Read, move || {
                if inner.closed.load(Ordering::Acquire) {
                    return OpPoll::Ready(Err(closed_error("listener")));
                }
                loop {
                    match inner.socket.accept() {
                        Ok((socket, peer)) => {
                            if let Err(e) = socket.set_nonblocking(true) {
                                return OpPoll::Ready(Err(Error::from(e)));
                            }
                            let Some(peer) = peer.as_socket() else {
                                return OpPoll::Ready(Err(Error::with_context(
                                    ErrorKind::InvalidArgument,
                                    "accepted peer has no inet address",
                                )));
                            };
                            return OpPoll::Ready(Ok((socket, AnyEndpoint::from(peer))));
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            return OpPoll::WouldBlock
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => return OpPoll::Ready(Err(Error::from(e))),
                    }
                }
            })
            .await?;
        Ok((TcpStream::from_socket(socket), peer))
    }

    /// Closes the listener; a pending accept fails with `Cancelled`.
    pub fn close(&self) {
        if !self.io.closed.swap(true, Ordering::AcqRel) {
            Reactor::global().deregister(self.io.socket.as_raw_fd());
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TcpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpListener")
            .field("local", &self.local_endpoint().ok())
            .field("closed", &self.io.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn sockaddr_to_endpoint(addr: socket2::SockAddr) -> Result<AnyEndpoint> {
    addr.as_socket().map(AnyEndpoint::from).ok_or_else(|| {
        Error::with_context(ErrorKind::InvalidArgument, "not an inet socket address")
    })
}
