//! Tor Browser fingerprint. Tor tracks Firefox ESR, with its privacy
//! posture reflected in the header set and a fixed English locale.

use crate::fingerprint::quic::QuicSpec;
use crate::fingerprint::{Fingerprint, ProfileId};
use crate::http::headers::OrderedHeaders;

use super::firefox;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0";

pub fn fingerprint() -> Fingerprint {
    Fingerprint {
        id: ProfileId::Tor,
        hello: firefox::client_hello(),
        h2: firefox::http2(),
        // Tor transports everything over the TCP circuit; the QUIC shape is
        // kept for completeness but HTTP/3 is disabled by the profile flag.
        quic: QuicSpec {
            hello: firefox::client_hello(),
            ..tor_quic_shape()
        },
        headers: default_headers(),
    }
}

fn tor_quic_shape() -> QuicSpec {
    QuicSpec {
        src_conn_id_length: 8,
        dest_conn_id_length: 8,
        init_packet_number_length: 1,
        init_packet_number: 0,
        client_token_length: 0,
        udp_datagram_min_size: 1357,
        hello: firefox::client_hello(),
        h3_settings: Vec::new(),
    }
}

fn default_headers() -> OrderedHeaders {
    [
        ("User-Agent", USER_AGENT),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
    .into_iter()
    .collect()
}
