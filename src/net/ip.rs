//! IP address and endpoint value types.
//!
//! IPv4 addresses are a packed 32-bit integer, IPv6 addresses 16 raw
//! bytes. Endpoints pair an address with a port and render as `IP:PORT`
//! (v4) or `[IP6]:PORT` (v6); [`AnyAddress`]/[`AnyEndpoint`] cover either
//! family. String forms round-trip through the standard library parsers
//! (RFC 5952 text for v6); the wire form packs v4 as a 32-bit big-endian
//! integer, v6 as 16 raw bytes, and endpoints as address followed by a
//! 16-bit big-endian port. All types serialize as their string form.
//!
//! Classification predicates:
//!
//! - localhost: `127.0.0.0/8`, `::1`, and mapped-v4 localhost
//! - private: RFC 1918 plus `169.254.0.0/16` for v4; `fc00::/7`,
//!   `fe80::/10`, mapped-v4 private and 6to4 of v4 private for v6
//! - multicast: `224.0.0.0/4`, `ff00::/8`
//! - public: neither private nor multicast, and (for v6) inside `2000::/3`

use bytes::{Buf, BufMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

const V4_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// Failure to parse an address or endpoint from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrParseError {
    /// Not a valid dotted-quad IPv4 address.
    #[error("invalid IPv4 address: {0:?}")]
    InvalidV4(String),
    /// Not a valid IPv6 address.
    #[error("invalid IPv6 address: {0:?}")]
    InvalidV6(String),
    /// Not a valid `IP:PORT` / `[IP6]:PORT` endpoint.
    #[error("invalid endpoint: {0:?}")]
    InvalidEndpoint(String),
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Self::with_context(ErrorKind::InvalidArgument, err.to_string())
    }
}

/// Too few bytes while decoding a wire-form address or endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("truncated wire data while decoding {0}")]
pub struct DecodeError(&'static str);

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Self::with_context(ErrorKind::InvalidArgument, err.to_string())
    }
}

/// An IPv4 address as a packed host-order integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u32);

impl Address {
    /// The unspecified address `0.0.0.0`.
    pub const ANY: Self = Self(0);

    /// From packed integer form: `10.1.2.3` is `0x0A01_0203`.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// The packed integer form.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// `127.0.0.0/8`.
    #[must_use]
    pub const fn is_localhost(self) -> bool {
        (self.0 >> 24) == 127
    }

    /// RFC 1918 ranges plus the `169.254.0.0/16` link-local block.
    #[must_use]
    pub const fn is_private(self) -> bool {
        (self.0 >> 24) == 10
            || (self.0 >> 20) == 0xAC1
            || (self.0 >> 16) == 0xC0A8
            || (self.0 >> 16) == 0xA9FE
    }

    /// `224.0.0.0/4`.
    #[must_use]
    pub const fn is_multicast(self) -> bool {
        (self.0 >> 28) == 0xE
    }

    /// Neither private nor multicast.
    #[must_use]
    pub const fn is_public(self) -> bool {
        !self.is_private() && !self.is_multicast()
    }

    /// Wire form: 32-bit big-endian integer.
    pub fn encode<B: BufMut>(self, buf: &mut B) {
        buf.put_u32(self.0);
    }

    /// Decodes the wire form.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        if buf.remaining() < 4 {
            return Err(DecodeError("IPv4 address"));
        }
        Ok(Self(buf.get_u32()))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Ipv4Addr::from(self.0))
    }
}

impl FromStr for Address {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v4: Ipv4Addr = s
            .parse()
            .map_err(|_| AddrParseError::InvalidV4(s.to_string()))?;
        Ok(Self(u32::from(v4)))
    }
}

impl From<Ipv4Addr> for Address {
    fn from(v4: Ipv4Addr) -> Self {
        Self(u32::from(v4))
    }
}

impl From<Address> for Ipv4Addr {
    fn from(addr: Address) -> Self {
        Self::from(addr.0)
    }
}

/// An IPv6 address as 16 raw bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressV6([u8; 16]);

impl AddressV6 {
    /// The unspecified address `::`.
    pub const ANY: Self = Self([0; 16]);
    /// `::1`.
    pub const LOCALHOST: Self = Self([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    /// From raw network-order bytes.
    #[must_use]
    pub const fn from_octets(octets: [u8; 16]) -> Self {
        Self(octets)
    }

    /// The raw bytes.
    #[must_use]
    pub const fn octets(self) -> [u8; 16] {
        self.0
    }

    /// True for mapped-v4 addresses, `::ffff:0:0/96`.
    #[must_use]
    pub fn is_mapped_v4(self) -> bool {
        self.0[..12] == V4_PREFIX
    }

    /// The embedded v4 address of a mapped-v4 address.
    #[must_use]
    pub fn mapped_v4(self) -> Option<Address> {
        if self.is_mapped_v4() {
            Some(embedded_v4(&self.0, 12))
        } else {
            None
        }
    }

    /// `::1` or mapped-v4 localhost.
    #[must_use]
    pub fn is_localhost(self) -> bool {
        self == Self::LOCALHOST || self.mapped_v4().is_some_and(Address::is_localhost)
    }

    /// `fc00::/7`, `fe80::/10`, localhost, mapped-v4 private, or a 6to4
    /// tunnel of a private v4 address.
    #[must_use]
    pub fn is_private(self) -> bool {
        if self.0[0] == 0x20 && self.0[1] == 0x02 {
            // 6to4: the tunnelled v4 address decides.
            return embedded_v4(&self.0, 2).is_private();
        }
        self.is_localhost()
            || self.mapped_v4().is_some_and(Address::is_private)
            || (self.0[0] & 0xfe) == 0xfc
            || (self.0[0] == 0xfe && (self.0[1] & 0xc0) == 0x80)
    }

    /// `ff00::/8`.
    #[must_use]
    pub const fn is_multicast(self) -> bool {
        self.0[0] == 0xff
    }

    /// Not private, and inside the global unicast block `2000::/3`.
    #[must_use]
    pub fn is_public(self) -> bool {
        !self.is_private() && (self.0[0] & 0xe0) == 0x20
    }

    /// Wire form: 16 raw bytes.
    pub fn encode<B: BufMut>(self, buf: &mut B) {
        buf.put_slice(&self.0);
    }

    /// Decodes the wire form.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        if buf.remaining() < 16 {
            return Err(DecodeError("IPv6 address"));
        }
        let mut octets = [0u8; 16];
        buf.copy_to_slice(&mut octets);
        Ok(Self(octets))
    }
}

fn embedded_v4(octets: &[u8; 16], at: usize) -> Address {
    Address::new(u32::from_be_bytes([
        octets[at],
        octets[at + 1],
        octets[at + 2],
        octets[at + 3],
    ]))
}

impl std::fmt::Display for AddressV6 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Ipv6Addr::from(self.0))
    }
}

impl FromStr for AddressV6 {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v6: Ipv6Addr = s
            .parse()
            .map_err(|_| AddrParseError::InvalidV6(s.to_string()))?;
        Ok(Self(v6.octets()))
    }
}

impl From<Address> for AddressV6 {
    /// The mapped-v4 form `::ffff:a.b.c.d`.
    fn from(v4: Address) -> Self {
        let mut octets = [0u8; 16];
        octets[..12].copy_from_slice(&V4_PREFIX);
        octets[12..].copy_from_slice(&v4.bits().to_be_bytes());
        Self(octets)
    }
}

impl From<Ipv6Addr> for AddressV6 {
    fn from(v6: Ipv6Addr) -> Self {
        Self(v6.octets())
    }
}

impl From<AddressV6> for Ipv6Addr {
    fn from(addr: AddressV6) -> Self {
        Self::from(addr.0)
    }
}

/// An IPv4 endpoint. Ordered by `(address, port)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    addr: Address,
    port: u16,
}

impl Endpoint {
    /// Pairs an address with a port.
    #[must_use]
    pub const fn new(addr: Address, port: u16) -> Self {
        Self { addr, port }
    }

    /// The address part.
    #[must_use]
    pub const fn addr(self) -> Address {
        self.addr
    }

    /// The port part.
    #[must_use]
    pub const fn port(self) -> u16 {
        self.port
    }

    /// Replaces the port.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Wire form: address, then 16-bit big-endian port.
    pub fn encode<B: BufMut>(self, buf: &mut B) {
        self.addr.encode(buf);
        buf.put_u16(self.port);
    }

    /// Decodes the wire form.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let addr = Address::decode(buf)?;
        if buf.remaining() < 2 {
            return Err(DecodeError("endpoint port"));
        }
        Ok(Self::new(addr, buf.get_u16()))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .split_once(':')
            .ok_or_else(|| AddrParseError::InvalidEndpoint(s.to_string()))?;
        let addr: Address = ip
            .parse()
            .map_err(|_| AddrParseError::InvalidEndpoint(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| AddrParseError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::new(addr, port))
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(sa: SocketAddrV4) -> Self {
        Self::new(Address::from(*sa.ip()), sa.port())
    }
}

impl From<Endpoint> for SocketAddrV4 {
    fn from(ep: Endpoint) -> Self {
        Self::new(ep.addr.into(), ep.port)
    }
}

/// An IPv6 endpoint. Ordered by `(address, port)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointV6 {
    addr: AddressV6,
    port: u16,
}

impl EndpointV6 {
    /// Pairs an address with a port.
    #[must_use]
    pub const fn new(addr: AddressV6, port: u16) -> Self {
        Self { addr, port }
    }

    /// The address part.
    #[must_use]
    pub const fn addr(self) -> AddressV6 {
        self.addr
    }

    /// The port part.
    #[must_use]
    pub const fn port(self) -> u16 {
        self.port
    }

    /// Replaces the port.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Wire form: address, then 16-bit big-endian port.
    pub fn encode<B: BufMut>(self, buf: &mut B) {
        self.addr.encode(buf);
        buf.put_u16(self.port);
    }

    /// Decodes the wire form.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let addr = AddressV6::decode(buf)?;
        if buf.remaining() < 2 {
            return Err(DecodeError("endpoint port"));
        }
        Ok(Self::new(addr, buf.get_u16()))
    }
}

impl std::fmt::Display for EndpointV6 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]:{}", self.addr, self.port)
    }
}

impl FromStr for EndpointV6 {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddrParseError::InvalidEndpoint(s.to_string());
        let rest = s.strip_prefix('[').ok_or_else(invalid)?;
        let (ip, port) = rest.split_once("]:").ok_or_else(invalid)?;
        let addr: AddressV6 = ip.parse().map_err(|_| invalid())?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        Ok(Self::new(addr, port))
    }
}

impl From<SocketAddrV6> for EndpointV6 {
    fn from(sa: SocketAddrV6) -> Self {
        Self::new(AddressV6::from(*sa.ip()), sa.port())
    }
}

impl From<EndpointV6> for SocketAddrV6 {
    fn from(ep: EndpointV6) -> Self {
        Self::new(ep.addr.into(), ep.port, 0, 0)
    }
}

/// An address of either family.
///
/// Structural equality: a v4 address never equals a v6 address, even its
/// own mapped form; use [`same_host`](Self::same_host) for that question.
/// The derived order is total: every v4 sorts before every v6, then by
/// `(address)` within the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnyAddress {
    /// An IPv4 address.
    V4(Address),
    /// An IPv6 address.
    V6(AddressV6),
}

impl AnyAddress {
    /// True when both sides name the same host, treating a mapped-v4 v6
    /// address as equal to the v4 address it embeds.
    #[must_use]
    pub fn same_host(self, other: Self) -> bool {
        match (self, other) {
            (Self::V4(a), Self::V4(b)) => a == b,
            (Self::V6(a), Self::V6(b)) => a == b,
            (Self::V4(v4), Self::V6(v6)) | (Self::V6(v6), Self::V4(v4)) => {
                v6.mapped_v4() == Some(v4)
            }
        }
    }

    /// Localhost in either family (mapped-v4 aware).
    #[must_use]
    pub fn is_localhost(self) -> bool {
        match self {
            Self::V4(a) => a.is_localhost(),
            Self::V6(a) => a.is_localhost(),
        }
    }

    /// Private in either family.
    #[must_use]
    pub fn is_private(self) -> bool {
        match self {
            Self::V4(a) => a.is_private(),
            Self::V6(a) => a.is_private(),
        }
    }

    /// Multicast in either family.
    #[must_use]
    pub fn is_multicast(self) -> bool {
        match self {
            Self::V4(a) => a.is_multicast(),
            Self::V6(a) => a.is_multicast(),
        }
    }

    /// Public in either family.
    #[must_use]
    pub fn is_public(self) -> bool {
        match self {
            Self::V4(a) => a.is_public(),
            Self::V6(a) => a.is_public(),
        }
    }
}

impl std::fmt::Display for AnyAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4(a) => write!(f, "{a}"),
            Self::V6(a) => write!(f, "{a}"),
        }
    }
}

impl FromStr for AnyAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Any v6 text contains a colon; dotted quads never do.
        if s.contains(':') {
            s.parse().map(Self::V6)
        } else {
            s.parse().map(Self::V4)
        }
    }
}

impl From<Address> for AnyAddress {
    fn from(addr: Address) -> Self {
        Self::V4(addr)
    }
}

impl From<AddressV6> for AnyAddress {
    fn from(addr: AddressV6) -> Self {
        Self::V6(addr)
    }
}

/// An endpoint of either family, ordered by `(family, address, port)`
/// with v4 before v6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnyEndpoint {
    addr: AnyAddress,
    port: u16,
}

impl AnyEndpoint {
    /// The v4 wildcard endpoint `0.0.0.0:0`.
    pub const ANY_V4: Self = Self {
        addr: AnyAddress::V4(Address::ANY),
        port: 0,
    };
    /// The v6 wildcard endpoint `[::]:0`.
    pub const ANY_V6: Self = Self {
        addr: AnyAddress::V6(AddressV6::ANY),
        port: 0,
    };

    /// Pairs an address with a port.
    #[must_use]
    pub const fn new(addr: AnyAddress, port: u16) -> Self {
        Self { addr, port }
    }

    /// The address part.
    #[must_use]
    pub const fn addr(self) -> AnyAddress {
        self.addr
    }

    /// The port part.
    #[must_use]
    pub const fn port(self) -> u16 {
        self.port
    }

    /// Replaces the port.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }
}

impl std::fmt::Display for AnyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.addr {
            AnyAddress::V4(a) => write!(f, "{}:{}", a, self.port),
            AnyAddress::V6(a) => write!(f, "[{}]:{}", a, self.port),
        }
    }
}

impl FromStr for AnyEndpoint {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('[') {
            let ep: EndpointV6 = s.parse()?;
            Ok(ep.into())
        } else {
            let ep: Endpoint = s.parse()?;
            Ok(ep.into())
        }
    }
}

impl From<Endpoint> for AnyEndpoint {
    fn from(ep: Endpoint) -> Self {
        Self::new(AnyAddress::V4(ep.addr()), ep.port())
    }
}

impl From<EndpointV6> for AnyEndpoint {
    fn from(ep: EndpointV6) -> Self {
        Self::new(AnyAddress::V6(ep.addr()), ep.port())
    }
}

impl From<SocketAddr> for AnyEndpoint {
    fn from(sa: SocketAddr) -> Self {
        match sa {
            SocketAddr::V4(v4) => Endpoint::from(v4).into(),
            SocketAddr::V6(v6) => EndpointV6::from(v6).into(),
        }
    }
}

impl From<AnyEndpoint> for SocketAddr {
    fn from(ep: AnyEndpoint) -> Self {
        match ep.addr {
            AnyAddress::V4(a) => Self::V4(SocketAddrV4::new(a.into(), ep.port)),
            AnyAddress::V6(a) => Self::V6(SocketAddrV6::new(a.into(), ep.port, 0, 0)),
        }
    }
}

macro_rules! string_serde {
    ($($ty:ty),+) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    )+};
}

string_serde!(Address, AddressV6, Endpoint, EndpointV6, AnyAddress, AnyEndpoint);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_parse_and_pack() {
        let addr: Address = "10.1.2.3".parse().unwrap();
        assert_eq!(addr.bits(), 0x0A01_0203);
        assert!(addr.is_private());
        assert!(!addr.is_public());
        assert!(!addr.is_multicast());
        assert_eq!(addr.to_string(), "10.1.2.3");
    }

    #[test]
    fn v4_classification() {
        let cases: &[(&str, bool, bool, bool)] = &[
            // (addr, private, multicast, localhost)
            ("10.255.255.255", true, false, false),
            ("172.16.0.1", true, false, false),
            ("172.32.0.1", false, false, false),
            ("192.168.1.1", true, false, false),
            ("169.254.10.10", true, false, false),
            ("224.0.0.1", false, true, false),
            ("239.255.255.255", false, true, false),
            ("127.0.0.1", false, false, true),
            ("8.8.8.8", false, false, false),
        ];
        for (text, private, multicast, localhost) in cases {
            let addr: Address = text.parse().unwrap();
            assert_eq!(addr.is_private(), *private, "{text} private");
            assert_eq!(addr.is_multicast(), *multicast, "{text} multicast");
            assert_eq!(addr.is_localhost(), *localhost, "{text} localhost");
        }
    }

    #[test]
    fn v6_mapped_v4() {
        let addr: AddressV6 = "::ffff:127.0.0.1".parse().unwrap();
        assert!(addr.is_mapped_v4());
        assert!(addr.is_localhost());
        assert_eq!(addr.mapped_v4(), Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn v6_classification() {
        assert!(AddressV6::LOCALHOST.is_localhost());
        assert!("fc00::1".parse::<AddressV6>().unwrap().is_private());
        assert!("fd12::1".parse::<AddressV6>().unwrap().is_private());
        assert!("fe80::1".parse::<AddressV6>().unwrap().is_private());
        // fe80::/10 does not reach fec0::.
        assert!(!"fec0::1".parse::<AddressV6>().unwrap().is_private());
        assert!("ff02::1".parse::<AddressV6>().unwrap().is_multicast());
        // 6to4 of a private v4 address is private; of a public one is not.
        assert!("2002:c0a8:0101::1".parse::<AddressV6>().unwrap().is_private());
        assert!(!"2002:0808:0808::1".parse::<AddressV6>().unwrap().is_private());
        let global: AddressV6 = "2001:db8::1".parse().unwrap();
        assert!(global.is_public());
        assert!(!global.is_private());
    }

    #[test]
    fn string_round_trip() {
        for text in ["0.0.0.0", "255.255.255.255", "192.0.2.33"] {
            let addr: Address = text.parse().unwrap();
            assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
        }
        for text in ["::", "::1", "2001:db8::8a2e:370:7334", "::ffff:1.2.3.4"] {
            let addr: AddressV6 = text.parse().unwrap();
            assert_eq!(addr.to_string().parse::<AddressV6>().unwrap(), addr);
        }
    }

    #[test]
    fn wire_round_trip() {
        let mut buf = bytes::BytesMut::new();
        let ep = Endpoint::new("10.1.2.3".parse().unwrap(), 8080);
        ep.encode(&mut buf);
        assert_eq!(&buf[..], &[0x0A, 0x01, 0x02, 0x03, 0x1F, 0x90]);
        let mut rd = buf.freeze();
        assert_eq!(Endpoint::decode(&mut rd).unwrap(), ep);

        let mut buf = bytes::BytesMut::new();
        let ep6 = EndpointV6::new("2001:db8::1".parse().unwrap(), 443);
        ep6.encode(&mut buf);
        assert_eq!(buf.len(), 18);
        let mut rd = buf.freeze();
        assert_eq!(EndpointV6::decode(&mut rd).unwrap(), ep6);
    }

    #[test]
    fn decode_rejects_truncation() {
        let mut short = bytes::Bytes::from_static(&[1, 2, 3]);
        assert!(Address::decode(&mut short).is_err());
        let mut short = bytes::Bytes::from_static(&[0; 17]);
        assert!(EndpointV6::decode(&mut short).is_err());
    }

    #[test]
    fn endpoint_strings() {
        let ep: Endpoint = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.to_string(), "127.0.0.1:8080");

        let ep6: EndpointV6 = "[::1]:443".parse().unwrap();
        assert_eq!(ep6.port(), 443);
        assert_eq!(ep6.to_string(), "[::1]:443");

        let any: AnyEndpoint = "[2001:db8::1]:7000".parse().unwrap();
        assert_eq!(any.to_string(), "[2001:db8::1]:7000");
        assert!("no-port".parse::<AnyEndpoint>().is_err());
        assert!("[::1]443".parse::<AnyEndpoint>().is_err());
    }

    #[test]
    fn endpoint_ordering_is_lexicographic() {
        let a: Endpoint = "10.0.0.1:80".parse().unwrap();
        let b: Endpoint = "10.0.0.1:443".parse().unwrap();
        let c: Endpoint = "10.0.0.2:1".parse().unwrap();
        assert!(a < b && b < c);

        // v4 sorts before v6, regardless of numeric value.
        let v4: AnyEndpoint = "255.255.255.255:65535".parse().unwrap();
        let v6: AnyEndpoint = "[::]:0".parse().unwrap();
        assert!(v4 < v6);
    }

    #[test]
    fn any_ordering_laws() {
        let endpoints: Vec<AnyEndpoint> = [
            "10.0.0.1:80",
            "10.0.0.1:443",
            "9.9.9.9:1",
            "[::1]:80",
            "[::1]:79",
            "[2001:db8::1]:1",
            "255.0.0.1:5",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

        // Antisymmetry and transitivity over every pair/triple.
        for a in &endpoints {
            for b in &endpoints {
                if a < b {
                    assert!(!(b < a));
                }
                if a == b {
                    assert!(!(a < b) && !(b < a));
                }
                for c in &endpoints {
                    if a < b && b < c {
                        assert!(a < c);
                    }
                }
            }
        }
    }

    #[test]
    fn same_host_sees_through_mapping() {
        let v4: AnyAddress = "127.0.0.1".parse().unwrap();
        let mapped: AnyAddress = "::ffff:127.0.0.1".parse().unwrap();
        let other: AnyAddress = "::1".parse().unwrap();
        assert!(v4.same_host(mapped));
        assert!(mapped.same_host(v4));
        assert!(!v4.same_host(other));
        // Structural equality stays family-strict.
        assert_ne!(v4, mapped);
    }

    #[test]
    fn serde_uses_string_form() {
        let ep: AnyEndpoint = "[::1]:9000".parse().unwrap();
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"[::1]:9000\"");
        let back: AnyEndpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);

        let addr: Address = "192.168.0.1".parse().unwrap();
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"192.168.0.1\"");
    }

    #[test]
    fn socket_addr_conversions() {
        let sa: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let ep = AnyEndpoint::from(sa);
        assert!(ep.addr().is_localhost());
        assert_eq!(SocketAddr::from(ep), sa);
    }
}
