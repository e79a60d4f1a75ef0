//! SOCKS5 UDP relay adapter properties over real loopback sockets.

use guise_client::connect::TargetAddr;
use guise_client::quic::{decode_socks5_udp, encode_socks5_udp, PacketConn, PacketConnError};
use tokio::net::UdpSocket;

fn ip(text: &str) -> TargetAddr {
    TargetAddr::Ip(text.parse().unwrap())
}

#[test]
fn write_read_round_trip_for_any_destination() {
    for (target, payload) in [
        (ip("192.0.2.7:4433"), &b"payload"[..]),
        (ip("[2001:db8::1]:443"), &b""[..]),
        (TargetAddr::Domain("h3.example".into(), 443), &b"\x00\xff"[..]),
    ] {
        let frame = encode_socks5_udp(&target, payload);
        let (decoded, offset) = decode_socks5_udp(&frame).unwrap();
        assert_eq!(decoded, target);
        assert_eq!(&frame[offset..], payload);
    }
}

#[tokio::test]
async fn socks5_read_attributes_frame_source() {
    let adapter_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter_addr = adapter_socket.local_addr().unwrap();

    let conn = PacketConn::socks5(
        adapter_socket,
        relay.local_addr().unwrap(),
        Some(ip("192.0.2.1:443")),
    );

    // 10-byte header (IPv4) + payload, FRAG=0
    let frame = encode_socks5_udp(&ip("198.51.100.2:443"), b"abc");
    relay.send_to(&frame, adapter_addr).await.unwrap();

    let mut buf = [0u8; 32];
    let (len, source) = conn.read_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..len], b"abc");
    assert_eq!(source, ip("198.51.100.2:443"));
}

#[tokio::test]
async fn fragmented_datagrams_are_rejected() {
    let adapter_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter_addr = adapter_socket.local_addr().unwrap();

    let conn = PacketConn::socks5(
        adapter_socket,
        relay.local_addr().unwrap(),
        Some(ip("192.0.2.1:443")),
    );

    let mut frame = encode_socks5_udp(&ip("198.51.100.2:443"), b"abc");
    frame[2] = 1; // FRAG
    relay.send_to(&frame, adapter_addr).await.unwrap();

    let mut buf = [0u8; 32];
    assert!(matches!(
        conn.read_from(&mut buf).await,
        Err(PacketConnError::FragNotSupported(1))
    ));
}

#[tokio::test]
async fn headerless_datagram_falls_back_to_default_target() {
    let adapter_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter_addr = adapter_socket.local_addr().unwrap();

    let conn = PacketConn::socks5(
        adapter_socket,
        peer.local_addr().unwrap(),
        Some(ip("192.0.2.9:443")),
    );
    peer.send_to(b"\xffnot-a-socks-frame", adapter_addr)
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let (_, source) = conn.read_from(&mut buf).await.unwrap();
    assert_eq!(source, ip("192.0.2.9:443"));
}

#[tokio::test]
async fn headerless_datagram_without_default_errors() {
    let adapter_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let adapter_addr = adapter_socket.local_addr().unwrap();

    let conn = PacketConn::socks5(adapter_socket, peer.local_addr().unwrap(), None);
    peer.send_to(b"\xffgarbage", adapter_addr).await.unwrap();

    let mut buf = [0u8; 64];
    assert!(matches!(
        conn.read_from(&mut buf).await,
        Err(PacketConnError::DefaultTargetRequired)
    ));
}

#[tokio::test]
async fn raw_mode_write_requires_an_ip_target() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let conn = PacketConn::raw(socket, peer.local_addr().unwrap());

    let named = TargetAddr::Domain("relay.example".into(), 443);
    assert!(matches!(
        conn.write_to(b"x", &named).await,
        Err(PacketConnError::NotUdp)
    ));

    // SOCKS5 mode accepts domains: the relay resolves them
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let conn = PacketConn::socks5(socket, peer.local_addr().unwrap(), None);
    conn.write_to(b"x", &TargetAddr::Domain("relay.example".into(), 443))
        .await
        .unwrap();
}

#[tokio::test]
async fn buffer_probes_always_succeed() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = "127.0.0.1:9".parse().unwrap();
    let conn = PacketConn::raw(socket, peer);
    conn.set_read_buffer(1 << 20).unwrap();
    conn.set_write_buffer(1 << 20).unwrap();
}
