//! QUIC Initial-packet shape and HTTP/3 SETTINGS fingerprint.

use super::hello::ClientHelloSpec;

/// HTTP/3 SETTINGS identifiers seen in browser fingerprints.
pub mod h3_setting {
    pub const QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
    pub const MAX_FIELD_SECTION_SIZE: u64 = 0x06;
    pub const QPACK_BLOCKED_STREAMS: u64 = 0x07;
    pub const ENABLE_CONNECT_PROTOCOL: u64 = 0x08;
    pub const H3_DATAGRAM: u64 = 0x33;
    /// A reserved identifier of the 0x1f * N + 0x21 family.
    pub const GREASE: u64 = 0x4d44;
}

/// The QUIC + HTTP/3 half of a fingerprint.
///
/// `hello` is the ClientHello embedded in the Initial CRYPTO frame; the
/// remaining fields shape the Initial packet itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicSpec {
    pub src_conn_id_length: usize,
    pub dest_conn_id_length: usize,
    /// Packet-number field length in the Initial, 1..=4 bytes.
    pub init_packet_number_length: u8,
    pub init_packet_number: u32,
    pub client_token_length: usize,
    /// Initial datagrams are padded up to this size.
    pub udp_datagram_min_size: usize,
    pub hello: ClientHelloSpec,
    /// H3 SETTINGS in emission order.
    pub h3_settings: Vec<(u64, u64)>,
}

impl QuicSpec {
    /// Canonical byte serialization used in transport-cache keys.
    pub fn cache_key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(self.src_conn_id_length as u8);
        out.push(self.dest_conn_id_length as u8);
        out.push(self.init_packet_number_length);
        out.extend_from_slice(&self.init_packet_number.to_be_bytes());
        out.extend_from_slice(&(self.client_token_length as u32).to_be_bytes());
        out.extend_from_slice(&(self.udp_datagram_min_size as u32).to_be_bytes());
        for (id, value) in &self.h3_settings {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&self.hello.seed().to_be_bytes());
        out
    }

    /// Source connection id bytes for a new connection, derived at the
    /// configured length.
    pub fn generate_scid(&self) -> Vec<u8> {
        let mut scid = vec![0u8; self.src_conn_id_length];
        fastrand::fill(&mut scid);
        scid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::profiles;

    #[test]
    fn scid_honors_configured_length() {
        let spec = profiles::chrome().quic;
        assert_eq!(spec.generate_scid().len(), spec.src_conn_id_length);
    }

    #[test]
    fn cache_key_reflects_settings_order() {
        let mut a = profiles::chrome().quic;
        let mut b = a.clone();
        assert_eq!(a.cache_key_bytes(), b.cache_key_bytes());
        b.h3_settings.reverse();
        if b.h3_settings.len() > 1 {
            assert_ne!(a.cache_key_bytes(), b.cache_key_bytes());
        }
        a.udp_datagram_min_size += 1;
        assert_ne!(a.cache_key_bytes(), profiles::chrome().quic.cache_key_bytes());
    }
}
