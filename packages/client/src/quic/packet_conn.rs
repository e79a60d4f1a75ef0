//! Datagram adapter between QUIC and the dialed UDP path.
//!
//! Two modes: `Raw` passes datagrams through unchanged and attributes them
//! to the configured default peer; `Socks5` wraps every datagram in the RFC
//! 1928 UDP request header (RSV|RSV|FRAG|ATYP|DST.ADDR|DST.PORT) for a UDP
//! ASSOCIATE relay.

use std::net::{IpAddr, SocketAddr};
use std::sync::RwLock;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::connect::socks::{ATYP_DOMAIN, ATYP_V4, ATYP_V6};
use crate::connect::TargetAddr;

#[derive(Debug, Error)]
pub enum PacketConnError {
    #[error("read buffer shorter than datagram ({datagram} > {buffer})")]
    BufferTooSmall { datagram: usize, buffer: usize },
    #[error("SOCKS5 UDP fragmentation not supported (FRAG={0})")]
    FragNotSupported(u8),
    #[error("datagram without SOCKS5 header and no default target configured")]
    DefaultTargetRequired,
    #[error("destination is not a UDP-addressable target")]
    NotUdp,
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Framing mode of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Raw,
    Socks5,
}

/// Encode the SOCKS5 UDP request header for `target` followed by `payload`.
pub fn encode_socks5_udp(target: &TargetAddr, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 22);
    out.extend_from_slice(&[0x00, 0x00, 0x00]); // RSV RSV FRAG=0
    match target {
        TargetAddr::Ip(SocketAddr::V4(addr)) => {
            out.push(ATYP_V4);
            out.extend_from_slice(&addr.ip().octets());
            out.extend_from_slice(&addr.port().to_be_bytes());
        }
        TargetAddr::Ip(SocketAddr::V6(addr)) => {
            out.push(ATYP_V6);
            out.extend_from_slice(&addr.ip().octets());
            out.extend_from_slice(&addr.port().to_be_bytes());
        }
        TargetAddr::Domain(host, port) => {
            out.push(ATYP_DOMAIN);
            out.push(host.len() as u8);
            out.extend_from_slice(host.as_bytes());
            out.extend_from_slice(&port.to_be_bytes());
        }
    }
    out.extend_from_slice(payload);
    out
}

/// Parse a SOCKS5 UDP frame into `(source, payload_offset)`.
pub fn decode_socks5_udp(frame: &[u8]) -> Result<(TargetAddr, usize), PacketConnError> {
    if frame.len() < 4 || frame[0] != 0 || frame[1] != 0 {
        return Err(PacketConnError::DefaultTargetRequired);
    }
    if frame[2] != 0 {
        return Err(PacketConnError::FragNotSupported(frame[2]));
    }
    match frame[3] {
        ATYP_V4 if frame.len() >= 10 => {
            let ip = IpAddr::from([frame[4], frame[5], frame[6], frame[7]]);
            let port = u16::from_be_bytes([frame[8], frame[9]]);
            Ok((TargetAddr::Ip(SocketAddr::new(ip, port)), 10))
        }
        ATYP_V6 if frame.len() >= 22 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&frame[4..20]);
            let port = u16::from_be_bytes([frame[20], frame[21]]);
            Ok((TargetAddr::Ip(SocketAddr::new(IpAddr::from(octets), port)), 22))
        }
        ATYP_DOMAIN if frame.len() >= 5 => {
            let len = frame[4] as usize;
            let end = 5 + len + 2;
            if frame.len() < end {
                return Err(PacketConnError::DefaultTargetRequired);
            }
            let host = String::from_utf8_lossy(&frame[5..5 + len]).into_owned();
            let port = u16::from_be_bytes([frame[end - 2], frame[end - 1]]);
            Ok((TargetAddr::Domain(host, port), end))
        }
        _ => Err(PacketConnError::DefaultTargetRequired),
    }
}

/// A datagram endpoint with optional SOCKS5 UDP framing.
#[derive(Debug)]
pub struct PacketConn {
    socket: UdpSocket,
    mode: Mode,
    default_target: Option<TargetAddr>,
    /// Where datagrams are physically sent: the relay in SOCKS5 mode, the
    /// target itself in raw mode.
    send_addr: SocketAddr,
    /// Last attributed peer; reads update it, writes observe it.
    remote: RwLock<Option<TargetAddr>>,
}

impl PacketConn {
    /// Raw mode: datagrams pass through unchanged.
    pub fn raw(socket: UdpSocket, target: SocketAddr) -> Self {
        Self {
            socket,
            mode: Mode::Raw,
            default_target: Some(TargetAddr::Ip(target)),
            send_addr: target,
            remote: RwLock::new(None),
        }
    }

    /// SOCKS5 mode: datagrams are framed for `relay`; `default_target`
    /// attributes headerless datagrams.
    pub fn socks5(
        socket: UdpSocket,
        relay: SocketAddr,
        default_target: Option<TargetAddr>,
    ) -> Self {
        Self {
            socket,
            mode: Mode::Socks5,
            default_target,
            send_addr: relay,
            remote: RwLock::new(None),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Last peer a read was attributed to.
    pub fn remote_addr(&self) -> Option<TargetAddr> {
        self.remote.read().expect("remote lock").clone()
    }

    /// Receive one datagram into `buf`; returns length and attributed source.
    pub async fn read_from(&self, buf: &mut [u8]) -> Result<(usize, TargetAddr), PacketConnError> {
        let mut raw = vec![0u8; buf.len() + 262]; // room for the largest SOCKS5 header
        let (len, _from) = self.socket.recv_from(&mut raw).await?;
        let datagram = &raw[..len];

        let (source, payload) = match self.mode {
            Mode::Raw => {
                let target = self
                    .default_target
                    .clone()
                    .ok_or(PacketConnError::DefaultTargetRequired)?;
                (target, datagram)
            }
            Mode::Socks5 => match decode_socks5_udp(datagram) {
                Ok((source, offset)) => (source, &datagram[offset..]),
                Err(PacketConnError::FragNotSupported(frag)) => {
                    return Err(PacketConnError::FragNotSupported(frag));
                }
                Err(_) => {
                    let target = self
                        .default_target
                        .clone()
                        .ok_or(PacketConnError::DefaultTargetRequired)?;
                    (target, datagram)
                }
            },
        };

        if payload.len() > buf.len() {
            return Err(PacketConnError::BufferTooSmall {
                datagram: payload.len(),
                buffer: buf.len(),
            });
        }
        buf[..payload.len()].copy_from_slice(payload);
        *self.remote.write().expect("remote lock") = Some(source.clone());
        Ok((payload.len(), source))
    }

    /// Send `payload` to `target`, framing it in SOCKS5 mode. Raw mode has
    /// no relay to resolve names, so a domain destination is rejected.
    pub async fn write_to(
        &self,
        payload: &[u8],
        target: &TargetAddr,
    ) -> Result<usize, PacketConnError> {
        let frame;
        let wire: &[u8] = match self.mode {
            Mode::Raw => match target {
                TargetAddr::Ip(_) => payload,
                TargetAddr::Domain(..) => return Err(PacketConnError::NotUdp),
            },
            Mode::Socks5 => {
                frame = encode_socks5_udp(target, payload);
                &frame
            }
        };
        let written = self.socket.send_to(wire, self.send_addr).await?;
        if written < wire.len() {
            return Err(PacketConnError::ShortWrite {
                written,
                expected: wire.len(),
            });
        }
        Ok(payload.len())
    }

    /// Best-effort receive-buffer sizing; unsupported platforms succeed.
    pub fn set_read_buffer(&self, bytes: usize) -> Result<(), PacketConnError> {
        let sock = socket2::SockRef::from(&self.socket);
        if let Err(e) = sock.set_recv_buffer_size(bytes) {
            tracing::debug!(error = %e, "recv buffer resize unsupported");
        }
        Ok(())
    }

    /// Best-effort send-buffer sizing; unsupported platforms succeed.
    pub fn set_write_buffer(&self, bytes: usize) -> Result<(), PacketConnError> {
        let sock = socket2::SockRef::from(&self.socket);
        if let Err(e) = sock.set_send_buffer_size(bytes) {
            tracing::debug!(error = %e, "send buffer resize unsupported");
        }
        Ok(())
    }
}
