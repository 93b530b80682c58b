//! Networking: address value types and async socket wrappers.
//!
//! - [`ip`]: IPv4/IPv6 addresses and endpoints with string and wire
//!   round-trips
//! - [`tcp`]: TCP stream/listener over the reactor bridge
//! - [`udp`]: UDP socket over the ordered poll service
//! - [`resolve`]: hostname resolution on the reactor threads

pub mod ip;
pub mod resolve;
pub mod tcp;
pub mod udp;

pub use ip::{Address, AddressV6, AnyAddress, AnyEndpoint, Endpoint, EndpointV6};
pub use resolve::resolve;
pub use tcp::{TcpListener, TcpStream};
pub use udp::UdpSocket;
