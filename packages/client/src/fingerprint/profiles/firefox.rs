//! Firefox desktop fingerprint (Gecko 133 line).

use crate::fingerprint::h2::{Http2Settings, Priority, SettingId};
use crate::fingerprint::hello::{version, ClientHelloSpec, Extension};
use crate::fingerprint::quic::{h3_setting, QuicSpec};
use crate::fingerprint::{Fingerprint, ProfileId};
use crate::http::headers::{OrderedHeaders, PseudoOrder};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0";

pub fn fingerprint() -> Fingerprint {
    Fingerprint {
        id: ProfileId::Firefox(133),
        hello: client_hello(),
        h2: http2(),
        quic: quic(),
        headers: default_headers(),
    }
}

pub(super) fn client_hello() -> ClientHelloSpec {
    ClientHelloSpec {
        min_version: version::TLS12,
        max_version: version::TLS13,
        cipher_suites: vec![
            0x1301, 0x1303, 0x1302, 0xc02b, 0xc02f, 0xcca9, 0xcca8, 0xc02c, 0xc030, 0xc00a,
            0xc009, 0xc013, 0xc014, 0x009c, 0x009d, 0x002f, 0x0035,
        ],
        compression_methods: vec![0],
        extensions: vec![
            Extension::ServerName,
            Extension::ExtendedMasterSecret,
            Extension::RenegotiationInfo,
            Extension::SupportedGroups(vec![0x001d, 0x0017, 0x0018, 0x0019, 0x0100, 0x0101]),
            Extension::EcPointFormats(vec![0]),
            Extension::SessionTicket,
            Extension::Alpn(vec!["h2".into(), "http/1.1".into()]),
            Extension::StatusRequest,
            Extension::DelegatedCredentials(vec![0x0403, 0x0503, 0x0603, 0x0203]),
            Extension::KeyShare(vec![0x001d, 0x0017]),
            Extension::SupportedVersions(vec![version::TLS13, version::TLS12]),
            Extension::SignatureAlgorithms(vec![
                0x0403, 0x0503, 0x0603, 0x0804, 0x0805, 0x0806, 0x0401, 0x0501, 0x0601, 0x0203,
                0x0201,
            ]),
            Extension::PskKeyExchangeModes(vec![1]),
            Extension::RecordSizeLimit(0x4001),
            Extension::Padding,
        ],
    }
}

pub(super) fn http2() -> Http2Settings {
    Http2Settings {
        settings: vec![
            (SettingId::HeaderTableSize, 65536),
            (SettingId::InitialWindowSize, 131_072),
            (SettingId::MaxFrameSize, 16_384),
        ],
        connection_flow: 12_517_377,
        priorities: vec![
            Priority { stream_id: 3, depends_on: 0, exclusive: false, weight: 200 },
            Priority { stream_id: 5, depends_on: 0, exclusive: false, weight: 100 },
            Priority { stream_id: 7, depends_on: 0, exclusive: false, weight: 0 },
            Priority { stream_id: 9, depends_on: 7, exclusive: false, weight: 0 },
            Priority { stream_id: 11, depends_on: 3, exclusive: false, weight: 0 },
            Priority { stream_id: 13, depends_on: 0, exclusive: false, weight: 240 },
        ],
        header_priority: Some(Priority {
            stream_id: 0,
            depends_on: 13,
            exclusive: false,
            weight: 41,
        }),
        pseudo_order: PseudoOrder::mpas(),
    }
}

fn quic() -> QuicSpec {
    QuicSpec {
        src_conn_id_length: 8,
        dest_conn_id_length: 8,
        init_packet_number_length: 1,
        init_packet_number: 0,
        client_token_length: 0,
        udp_datagram_min_size: 1357,
        hello: client_hello(),
        h3_settings: vec![
            (h3_setting::QPACK_MAX_TABLE_CAPACITY, 65536),
            (h3_setting::MAX_FIELD_SECTION_SIZE, 393_216),
            (h3_setting::QPACK_BLOCKED_STREAMS, 20),
            (h3_setting::H3_DATAGRAM, 1),
        ],
    }
}

fn default_headers() -> OrderedHeaders {
    [
        ("User-Agent", USER_AGENT),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/png,image/svg+xml,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate, br, zstd"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
    ]
    .into_iter()
    .collect()
}
