//! JA3 string parsing.
//!
//! A JA3 string is `version,ciphers,extensions,curves,point_formats` with
//! dash-separated decimal lists. Parsing produces a [`ClientHelloSpec`]
//! whose extension payloads are filled with structural defaults; fields the
//! string cannot express (ALPN contents, signature algorithms) use the
//! common browser values and can be overridden piecewise afterwards.

use thiserror::Error;

use super::hello::{version, ClientHelloSpec, Extension};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Ja3Error {
    #[error("JA3 string must have 5 comma-separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid number in JA3 field: {0:?}")]
    BadNumber(String),
    #[error("unsupported TLS version {0}")]
    BadVersion(u16),
}

/// Signature algorithms offered when the JA3 string selects extension 13.
const DEFAULT_SIGALGS: &[u16] = &[
    0x0403, 0x0804, 0x0401, 0x0503, 0x0805, 0x0501, 0x0806, 0x0601,
];

/// Parse a JA3 string into a ClientHello specification.
pub fn parse(ja3: &str) -> Result<ClientHelloSpec, Ja3Error> {
    let fields: Vec<&str> = ja3.trim().split(',').collect();
    if fields.len() != 5 {
        return Err(Ja3Error::FieldCount(fields.len()));
    }

    let max_version = parse_one(fields[0])?;
    if !matches!(
        max_version,
        version::TLS10 | version::TLS11 | version::TLS12 | version::TLS13
    ) {
        return Err(Ja3Error::BadVersion(max_version));
    }

    let cipher_suites = parse_list(fields[1])?;
    let extension_ids = parse_list(fields[2])?;
    let curves = parse_list(fields[3])?;
    let point_formats = parse_list(fields[4])?
        .into_iter()
        .map(|p| p as u8)
        .collect::<Vec<_>>();

    let mut extensions = Vec::with_capacity(extension_ids.len());
    for id in &extension_ids {
        extensions.push(default_extension(*id, max_version, &curves, &point_formats));
    }

    Ok(ClientHelloSpec {
        min_version: version::TLS12.min(max_version),
        max_version,
        cipher_suites,
        compression_methods: vec![0],
        extensions,
    })
}

fn default_extension(
    id: u16,
    max_version: u16,
    curves: &[u16],
    point_formats: &[u8],
) -> Extension {
    match id {
        0 => Extension::ServerName,
        5 => Extension::StatusRequest,
        10 => Extension::SupportedGroups(curves.to_vec()),
        11 => Extension::EcPointFormats(point_formats.to_vec()),
        13 => Extension::SignatureAlgorithms(DEFAULT_SIGALGS.to_vec()),
        16 => Extension::Alpn(vec!["h2".into(), "http/1.1".into()]),
        18 => Extension::SignedCertTimestamp,
        21 => Extension::Padding,
        23 => Extension::ExtendedMasterSecret,
        27 => Extension::CompressCertificate(vec![0x0002]), // brotli
        28 => Extension::RecordSizeLimit(0x4001),
        34 => Extension::DelegatedCredentials(vec![0x0403, 0x0503, 0x0603, 0x0203]),
        35 => Extension::SessionTicket,
        41 => Extension::PreSharedKey,
        43 => {
            let mut versions = Vec::new();
            if max_version >= version::TLS13 {
                versions.push(version::TLS13);
            }
            versions.push(version::TLS12);
            Extension::SupportedVersions(versions)
        }
        45 => Extension::PskKeyExchangeModes(vec![1]), // psk_dhe_ke
        51 => {
            let preferred = curves
                .iter()
                .copied()
                .find(|c| !super::hello::is_grease(*c))
                .unwrap_or(0x001d);
            Extension::KeyShare(vec![preferred])
        }
        17513 => Extension::ApplicationSettings(vec!["h2".into()]),
        65037 => Extension::EncryptedClientHello,
        65281 => Extension::RenegotiationInfo,
        other => Extension::Unknown(other, Vec::new()),
    }
}

fn parse_list(field: &str) -> Result<Vec<u16>, Ja3Error> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field.split('-').map(parse_one).collect()
}

fn parse_one(text: &str) -> Result<u16, Ja3Error> {
    text.parse::<u16>()
        .map_err(|_| Ja3Error::BadNumber(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_LIKE: &str =
        "771,4865-4866-4867-49195-49199,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-21,29-23-24,0";

    #[test]
    fn parse_round_trips_through_ja3_text() {
        let spec = parse(CHROME_LIKE).unwrap();
        // ja3() reports max_version, which for "771" (TLS 1.2) matches.
        assert_eq!(spec.ja3(), CHROME_LIKE);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(parse("771,1-2,3"), Err(Ja3Error::FieldCount(3)));
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(matches!(
            parse("771,worm,0,29,0"),
            Err(Ja3Error::BadNumber(_))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(parse("9999,1,0,29,0"), Err(Ja3Error::BadVersion(9999)));
    }
}
