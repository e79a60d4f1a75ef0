//! Chrome desktop fingerprint (Chromium 131 line).

use crate::fingerprint::h2::{Http2Settings, Priority, SettingId};
use crate::fingerprint::hello::{version, ClientHelloSpec, Extension, GREASE};
use crate::fingerprint::quic::{h3_setting, QuicSpec};
use crate::fingerprint::{Fingerprint, ProfileId};
use crate::http::headers::{OrderedHeaders, PseudoOrder};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub fn fingerprint() -> Fingerprint {
    Fingerprint {
        id: ProfileId::Chrome(131),
        hello: client_hello(),
        h2: http2(),
        quic: quic(),
        headers: default_headers(),
    }
}

fn client_hello() -> ClientHelloSpec {
    ClientHelloSpec {
        min_version: version::TLS12,
        max_version: version::TLS13,
        cipher_suites: vec![
            GREASE, 0x1301, 0x1302, 0x1303, 0xc02b, 0xc02f, 0xc02c, 0xc030, 0xcca9, 0xcca8,
            0xc013, 0xc014, 0x009c, 0x009d, 0x002f, 0x0035,
        ],
        compression_methods: vec![0],
        extensions: vec![
            Extension::Grease(0),
            Extension::ServerName,
            Extension::ExtendedMasterSecret,
            Extension::RenegotiationInfo,
            Extension::SupportedGroups(vec![GREASE, 0x11ec, 0x001d, 0x0017, 0x0018]),
            Extension::EcPointFormats(vec![0]),
            Extension::SessionTicket,
            Extension::Alpn(vec!["h2".into(), "http/1.1".into()]),
            Extension::StatusRequest,
            Extension::SignatureAlgorithms(vec![
                0x0403, 0x0804, 0x0401, 0x0503, 0x0805, 0x0501, 0x0806, 0x0601,
            ]),
            Extension::SignedCertTimestamp,
            Extension::KeyShare(vec![GREASE, 0x11ec, 0x001d]),
            Extension::PskKeyExchangeModes(vec![1]),
            Extension::SupportedVersions(vec![GREASE, version::TLS13, version::TLS12]),
            Extension::CompressCertificate(vec![0x0002]),
            Extension::ApplicationSettings(vec!["h2".into()]),
            Extension::EncryptedClientHello,
            Extension::Grease(1),
            Extension::Padding,
        ],
    }
}

fn http2() -> Http2Settings {
    Http2Settings {
        settings: vec![
            (SettingId::HeaderTableSize, 65536),
            (SettingId::EnablePush, 0),
            (SettingId::InitialWindowSize, 6_291_456),
            (SettingId::MaxHeaderListSize, 262_144),
        ],
        connection_flow: 15_663_105,
        priorities: Vec::new(),
        header_priority: Some(Priority {
            stream_id: 0,
            depends_on: 0,
            exclusive: true,
            weight: 255,
        }),
        pseudo_order: PseudoOrder::masp(),
    }
}

fn quic() -> QuicSpec {
    QuicSpec {
        src_conn_id_length: 0,
        dest_conn_id_length: 8,
        init_packet_number_length: 1,
        init_packet_number: 1,
        client_token_length: 0,
        udp_datagram_min_size: 1350,
        hello: client_hello(),
        h3_settings: vec![
            (h3_setting::QPACK_MAX_TABLE_CAPACITY, 65536),
            (h3_setting::MAX_FIELD_SECTION_SIZE, 262_144),
            (h3_setting::QPACK_BLOCKED_STREAMS, 100),
            (h3_setting::H3_DATAGRAM, 1),
            (h3_setting::GREASE, 1),
        ],
    }
}

fn default_headers() -> OrderedHeaders {
    [
        (
            "sec-ch-ua",
            r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
        ("Upgrade-Insecure-Requests", "1"),
        ("User-Agent", USER_AGENT),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-User", "?1"),
        ("Sec-Fetch-Dest", "document"),
        ("Accept-Encoding", "gzip, deflate, br, zstd"),
        ("Accept-Language", "en-US,en;q=0.9"),
    ]
    .into_iter()
    .collect()
}
