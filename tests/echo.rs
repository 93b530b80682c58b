#![allow(missing_docs)]

mod common;

use bytes::{Bytes, BytesMut};
use common::init_test_logging;
use filament::net::{resolve, TcpListener, TcpStream, UdpSocket};
use filament::{block_on, initialize_fibers, spawn, yield_now, Error};
use std::sync::Arc;

/// Connect, send "hello world", receive the echoed reply; then reconnect
/// after the server closed the first connection.
#[test]
fn tcp_echo_and_reconnect() {
    init_test_logging();
    initialize_fibers();

    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let server_at = listener.local_endpoint().unwrap();

    let server = spawn(async move {
        for _ in 0..2 {
            let (stream, _peer) = listener.accept().await?;
            let (request, _n) = stream.read_some(BytesMut::new(), 256).await?;
            let mut reply = BytesMut::from(&b"echo: "[..]);
            reply.extend_from_slice(&request);
            stream.write_all(reply.freeze()).await?;
            stream.close();
        }
        Ok::<_, Error>(())
    });

    let client = spawn(async move {
        for round in 0..2 {
            let stream = TcpStream::connect(server_at).await?;
            stream.write_all(Bytes::from_static(b"hello world")).await?;
            let reply = stream.read_exact(BytesMut::new(), 17).await?;
            assert_eq!(&reply[..], b"echo: hello world", "round {round}");
            // The server closed after replying; the next read is EOF.
            let eof = stream.read_some(BytesMut::new(), 16).await;
            assert!(eof.unwrap_err().is_eof(), "round {round}");
        }
        Ok::<_, Error>(())
    });

    block_on(client).unwrap().unwrap();
    block_on(server).unwrap().unwrap();
}

/// Closing a listener with an accept in flight fails that accept with a
/// cancellation, deterministically.
#[test]
fn closing_listener_cancels_pending_accept() {
    init_test_logging();
    initialize_fibers();

    let listener = Arc::new(TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap());
    let l = listener.clone();
    let join = spawn(async move { l.accept().await });

    // Let the accept park in the reactor before closing.
    block_on(async {
        for _ in 0..4 {
            yield_now().await;
        }
    });
    listener.close();

    let result = block_on(join).unwrap();
    assert!(result.unwrap_err().is_cancelled());
}

/// An accept submitted after the close fails the same way.
#[test]
fn accept_after_close_is_cancelled() {
    init_test_logging();
    initialize_fibers();

    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    listener.close();
    let result = block_on(listener.accept());
    assert!(result.unwrap_err().is_cancelled());
}

#[test]
fn udp_round_trip() {
    init_test_logging();
    initialize_fibers();

    let a = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let b = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let b_at = b.local_endpoint().unwrap();

    block_on(async move {
        let sent = a.send_to(Bytes::from_static(b"ping"), b_at).await?;
        assert_eq!(sent, 4);
        let (datagram, n, from) = b.receive_from(BytesMut::new(), 64).await?;
        assert_eq!(n, 4);
        assert_eq!(&datagram[..], b"ping");
        assert_eq!(from, a.local_endpoint()?);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// `resolve("localhost", …)` yields at least one endpoint that is
/// localhost.
#[test]
fn resolve_localhost() {
    init_test_logging();
    initialize_fibers();

    let endpoints = block_on(resolve("localhost", 0)).unwrap();
    assert!(!endpoints.is_empty());
    assert!(
        endpoints.iter().any(|ep| ep.addr().is_localhost()),
        "no localhost endpoint in {endpoints:?}"
    );
}
