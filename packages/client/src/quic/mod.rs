//! QUIC datagram plumbing shared by the HTTP/3 transport.

pub mod packet_conn;

pub use packet_conn::{decode_socks5_udp, encode_socks5_udp, Mode, PacketConn, PacketConnError};

use crate::error::{self, Error};

/// Fold adapter failures into the client error taxonomy: short writes keep
/// their own kind, SOCKS framing violations are protocol errors, the rest
/// is body I/O.
pub(crate) fn packet_conn_error(e: PacketConnError) -> Error {
    match e {
        PacketConnError::ShortWrite { written, expected } => error::short_write(written, expected),
        PacketConnError::FragNotSupported(_) | PacketConnError::NotUdp => {
            error::protocol(e.to_string())
        }
        PacketConnError::BufferTooSmall { .. }
        | PacketConnError::DefaultTargetRequired => error::body(e.to_string()),
        PacketConnError::Io(io) => error::body(io),
    }
}
