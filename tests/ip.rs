#![allow(missing_docs)]

mod common;

use common::init_test_logging;
use filament::net::{Address, AddressV6, AnyEndpoint, Endpoint};

/// `10.1.2.3` parses, classifies, and packs as `0x0A010203`.
#[test]
fn v4_basics() {
    init_test_logging();
    let addr: Address = "10.1.2.3".parse().unwrap();
    assert!(addr.is_private());
    assert!(!addr.is_public());
    assert!(!addr.is_multicast());
    assert_eq!(addr.bits(), 0x0A01_0203);
}

/// `::ffff:127.0.0.1` is localhost, mapped-v4, and maps to `127.0.0.1`.
#[test]
fn v6_mapped_localhost() {
    init_test_logging();
    let addr: AddressV6 = "::ffff:127.0.0.1".parse().unwrap();
    assert!(addr.is_localhost());
    assert!(addr.is_mapped_v4());
    assert_eq!(addr.mapped_v4(), Some("127.0.0.1".parse().unwrap()));
}

/// binary -> string -> binary is the identity for both families.
#[test]
fn binary_string_binary_round_trip() {
    init_test_logging();
    for bits in [0u32, 1, 0x7F00_0001, 0x0A01_0203, 0xFFFF_FFFF, 0xC0A8_0101] {
        let addr = Address::new(bits);
        let text = addr.to_string();
        assert_eq!(text.parse::<Address>().unwrap().bits(), bits, "{text}");
    }
    let blobs: [[u8; 16]; 4] = [
        [0; 16],
        [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
        [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x42],
        [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0x02, 0x1b, 0x44, 0xff, 0xfe, 0x11, 0x22, 0x33],
    ];
    for blob in blobs {
        let addr = AddressV6::from_octets(blob);
        let text = addr.to_string();
        assert_eq!(text.parse::<AddressV6>().unwrap().octets(), blob, "{text}");
    }
}

#[test]
fn endpoint_rendering() {
    init_test_logging();
    let v4: AnyEndpoint = "192.168.1.10:8080".parse().unwrap();
    assert_eq!(v4.to_string(), "192.168.1.10:8080");
    let v6: AnyEndpoint = "[2001:db8::1]:8080".parse().unwrap();
    assert_eq!(v6.to_string(), "[2001:db8::1]:8080");
    assert!("300.1.2.3:1".parse::<AnyEndpoint>().is_err());
    assert!("10.1.2.3:99999".parse::<AnyEndpoint>().is_err());
}

/// The cross-family total order: every v4 endpoint before every v6, then
/// `(address, port)` within a family.
#[test]
fn endpoint_total_order() {
    init_test_logging();
    let mut endpoints: Vec<AnyEndpoint> = [
        "[::1]:80",
        "10.0.0.1:443",
        "[2001:db8::1]:1",
        "10.0.0.1:80",
        "255.255.255.255:1",
        "0.0.0.0:0",
    ]
    .iter()
    .map(|s| s.parse().unwrap())
    .collect();
    endpoints.sort();
    let rendered: Vec<String> = endpoints.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        [
            "0.0.0.0:0",
            "10.0.0.1:80",
            "10.0.0.1:443",
            "255.255.255.255:1",
            "[::1]:80",
            "[2001:db8::1]:1",
        ]
    );

    let wire: Endpoint = "10.1.2.3:5".parse().unwrap();
    let mut buf = bytes::BytesMut::new();
    wire.encode(&mut buf);
    let mut rd = buf.freeze();
    assert_eq!(Endpoint::decode(&mut rd).unwrap(), wire);
}
