//! TLS ClientHello specification and its canonical byte encoding.
//!
//! A [`ClientHelloSpec`] is the single source of truth for the TLS half of a
//! browser fingerprint: cipher-suite order, extension order, groups, ALPN and
//! GREASE placement. `encode()` renders the spec to ClientHello bytes; the
//! rendering is the canonical fingerprint projection used for JA3 digests,
//! transport-cache keys and the byte-identity tests. Variable fields (random,
//! session id, key-share public keys, GREASE values) are derived from a seed
//! computed over the spec itself, so equal specs always encode equal bytes.

use md5::{Digest, Md5};

/// Placeholder for a GREASE value inside cipher/group/version lists. The
/// concrete value is chosen from the RFC 8701 set at encode time.
pub const GREASE: u16 = 0x0a0a;

/// TLS protocol version constants as they appear on the wire.
pub mod version {
    pub const TLS10: u16 = 0x0301;
    pub const TLS11: u16 = 0x0302;
    pub const TLS12: u16 = 0x0303;
    pub const TLS13: u16 = 0x0304;
}

/// One extension slot in the ClientHello, in emission order.
///
/// Extensions carrying per-target data (`ServerName`, `KeyShare`,
/// `PreSharedKey`) hold only their shape here; the wildcard fields are
/// filled at encode/dial time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// 0 — filled with the target host at encode time.
    ServerName,
    /// 5 — OCSP status request.
    StatusRequest,
    /// 10 — named groups; entries may be [`GREASE`].
    SupportedGroups(Vec<u16>),
    /// 11 — EC point formats.
    EcPointFormats(Vec<u8>),
    /// 13 — signature algorithms.
    SignatureAlgorithms(Vec<u16>),
    /// 16 — ALPN protocol names.
    Alpn(Vec<String>),
    /// 18 — signed certificate timestamp.
    SignedCertTimestamp,
    /// 21 — padding to the BoringSSL 512-byte target.
    Padding,
    /// 23 — extended master secret.
    ExtendedMasterSecret,
    /// 27 — certificate compression algorithms.
    CompressCertificate(Vec<u16>),
    /// 28 — record size limit.
    RecordSizeLimit(u16),
    /// 34 — delegated credentials signature algorithms.
    DelegatedCredentials(Vec<u16>),
    /// 35 — session ticket (empty on a fresh session).
    SessionTicket,
    /// 41 — pre-shared key; present only when the engine resumes.
    PreSharedKey,
    /// 43 — supported versions; entries may be [`GREASE`].
    SupportedVersions(Vec<u16>),
    /// 45 — PSK key exchange modes.
    PskKeyExchangeModes(Vec<u8>),
    /// 51 — key share groups; key material is derived at encode time.
    KeyShare(Vec<u16>),
    /// 17513 — ALPS application settings.
    ApplicationSettings(Vec<String>),
    /// 65037 — GREASE ECH.
    EncryptedClientHello,
    /// 65281 — renegotiation info.
    RenegotiationInfo,
    /// A GREASE extension slot; `0` and `1` select independent values.
    Grease(u8),
    /// Any extension this model does not know structurally.
    Unknown(u16, Vec<u8>),
}

impl Extension {
    /// The wire identifier, with GREASE slots resolved through `values`.
    fn id(&self, values: &GreaseValues) -> u16 {
        match self {
            Extension::ServerName => 0,
            Extension::StatusRequest => 5,
            Extension::SupportedGroups(_) => 10,
            Extension::EcPointFormats(_) => 11,
            Extension::SignatureAlgorithms(_) => 13,
            Extension::Alpn(_) => 16,
            Extension::SignedCertTimestamp => 18,
            Extension::Padding => 21,
            Extension::ExtendedMasterSecret => 23,
            Extension::CompressCertificate(_) => 27,
            Extension::RecordSizeLimit(_) => 28,
            Extension::DelegatedCredentials(_) => 34,
            Extension::SessionTicket => 35,
            Extension::PreSharedKey => 41,
            Extension::SupportedVersions(_) => 43,
            Extension::PskKeyExchangeModes(_) => 45,
            Extension::KeyShare(_) => 51,
            Extension::ApplicationSettings(_) => 17513,
            Extension::EncryptedClientHello => 65037,
            Extension::RenegotiationInfo => 65281,
            Extension::Grease(slot) => values.extension(*slot),
            Extension::Unknown(id, _) => *id,
        }
    }

    /// The identifier used in JA3 text: GREASE slots are excluded there.
    pub fn ja3_id(&self) -> Option<u16> {
        match self {
            Extension::Grease(_) => None,
            other => Some(other.id(&GreaseValues::ZERO)),
        }
    }
}

/// The full ClientHello shape of a fingerprint target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloSpec {
    pub min_version: u16,
    pub max_version: u16,
    /// Cipher suites in emission order; entries may be [`GREASE`].
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    /// Extensions in emission order.
    pub extensions: Vec<Extension>,
}

impl ClientHelloSpec {
    /// A stable 64-bit seed over the spec contents. Drives GREASE selection
    /// and the deterministic variable fields of the canonical encoding.
    pub fn seed(&self) -> u64 {
        // FNV-1a over a canonical serialization; stable across processes.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let mut eat = |byte: u8| {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        };
        for v in [self.min_version, self.max_version] {
            eat((v >> 8) as u8);
            eat(v as u8);
        }
        for suite in &self.cipher_suites {
            eat((*suite >> 8) as u8);
            eat(*suite as u8);
        }
        for m in &self.compression_methods {
            eat(*m);
        }
        for ext in &self.extensions {
            let id = ext.id(&GreaseValues::ZERO);
            eat((id >> 8) as u8);
            eat(id as u8);
        }
        hash
    }

    /// The JA3 text `version,ciphers,extensions,curves,formats`, GREASE
    /// values excluded per the JA3 specification.
    pub fn ja3(&self) -> String {
        let ciphers = join_ids(self.cipher_suites.iter().copied().filter(|c| !is_grease(*c)));
        let extensions = join_ids(self.extensions.iter().filter_map(Extension::ja3_id));
        let mut curves = String::new();
        let mut formats = String::new();
        for ext in &self.extensions {
            match ext {
                Extension::SupportedGroups(groups) => {
                    curves = join_ids(groups.iter().copied().filter(|g| !is_grease(*g)));
                }
                Extension::EcPointFormats(points) => {
                    formats = join_ids(points.iter().map(|p| u16::from(*p)));
                }
                _ => {}
            }
        }
        format!(
            "{},{},{},{},{}",
            self.max_version, ciphers, extensions, curves, formats
        )
    }

    /// Lowercase hex MD5 of the JA3 text.
    pub fn ja3_hash(&self) -> String {
        let digest = Md5::digest(self.ja3().as_bytes());
        hex::encode(digest)
    }

    /// Render the canonical ClientHello handshake message for `host`.
    ///
    /// Deterministic by construction: every variable field (random, session
    /// id, key-share keys, GREASE values) derives from [`seed`](Self::seed),
    /// so the same spec and host produce identical bytes regardless of DNS,
    /// proxy or prior connections. This is the documented resolution of the
    /// GREASE placement question: values come from the RFC 8701 set, chosen
    /// by the spec seed.
    pub fn encode(&self, host: &str) -> Vec<u8> {
        let seed = self.seed();
        let grease = GreaseValues::from_seed(seed);
        let mut rng = SplitMix64::new(seed);

        let mut body = Vec::with_capacity(512);
        // legacy_version is pinned at TLS 1.2 for 1.3-capable hellos
        put_u16(&mut body, version::TLS12.min(self.max_version));

        let mut random = [0u8; 32];
        rng.fill(&mut random);
        body.extend_from_slice(&random);

        let mut session_id = [0u8; 32];
        rng.fill(&mut session_id);
        body.push(32);
        body.extend_from_slice(&session_id);

        put_u16(&mut body, (self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            let value = if is_grease(*suite) {
                grease.cipher()
            } else {
                *suite
            };
            put_u16(&mut body, value);
        }

        body.push(self.compression_methods.len() as u8);
        body.extend_from_slice(&self.compression_methods);

        // Extensions, two passes so Padding can observe the unpadded length.
        let mut extensions = Vec::with_capacity(512);
        let unpadded: usize = self
            .extensions
            .iter()
            .filter(|e| !matches!(e, Extension::Padding))
            .map(|e| 4 + self.extension_payload(e, host, &grease, &mut rng.clone()).len())
            .sum();
        for ext in &self.extensions {
            let payload = if let Extension::Padding = ext {
                padding_payload(body.len() + 2 + unpadded)
            } else {
                self.extension_payload(ext, host, &grease, &mut rng)
            };
            put_u16(&mut extensions, ext.id(&grease));
            put_u16(&mut extensions, payload.len() as u16);
            extensions.extend_from_slice(&payload);
        }
        put_u16(&mut body, extensions.len() as u16);
        body.extend_from_slice(&extensions);

        let mut hello = Vec::with_capacity(body.len() + 4);
        hello.push(0x01); // handshake type: client_hello
        hello.push((body.len() >> 16) as u8);
        hello.push((body.len() >> 8) as u8);
        hello.push(body.len() as u8);
        hello.extend_from_slice(&body);
        hello
    }

    fn extension_payload(
        &self,
        ext: &Extension,
        host: &str,
        grease: &GreaseValues,
        rng: &mut SplitMix64,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        match ext {
            Extension::ServerName => {
                let name = host.as_bytes();
                put_u16(&mut out, (name.len() + 3) as u16);
                out.push(0); // name_type host_name
                put_u16(&mut out, name.len() as u16);
                out.extend_from_slice(name);
            }
            Extension::StatusRequest => {
                out.push(1); // ocsp
                put_u16(&mut out, 0);
                put_u16(&mut out, 0);
            }
            Extension::SupportedGroups(groups) => {
                put_u16(&mut out, (groups.len() * 2) as u16);
                for group in groups {
                    let value = if is_grease(*group) {
                        grease.group()
                    } else {
                        *group
                    };
                    put_u16(&mut out, value);
                }
            }
            Extension::EcPointFormats(points) => {
                out.push(points.len() as u8);
                out.extend_from_slice(points);
            }
            Extension::SignatureAlgorithms(algs) | Extension::DelegatedCredentials(algs) => {
                put_u16(&mut out, (algs.len() * 2) as u16);
                for alg in algs {
                    put_u16(&mut out, *alg);
                }
            }
            Extension::Alpn(protocols) => {
                let total: usize = protocols.iter().map(|p| p.len() + 1).sum();
                put_u16(&mut out, total as u16);
                for protocol in protocols {
                    out.push(protocol.len() as u8);
                    out.extend_from_slice(protocol.as_bytes());
                }
            }
            Extension::SignedCertTimestamp
            | Extension::ExtendedMasterSecret
            | Extension::SessionTicket
            | Extension::PreSharedKey => {}
            Extension::Padding => unreachable!("padding handled by caller"),
            Extension::CompressCertificate(algs) => {
                out.push((algs.len() * 2) as u8);
                for alg in algs {
                    put_u16(&mut out, *alg);
                }
            }
            Extension::RecordSizeLimit(limit) => {
                put_u16(&mut out, *limit);
            }
            Extension::SupportedVersions(versions) => {
                out.push((versions.len() * 2) as u8);
                for v in versions {
                    let value = if is_grease(*v) { grease.version() } else { *v };
                    put_u16(&mut out, value);
                }
            }
            Extension::PskKeyExchangeModes(modes) => {
                out.push(modes.len() as u8);
                out.extend_from_slice(modes);
            }
            Extension::KeyShare(groups) => {
                let mut shares = Vec::new();
                for group in groups {
                    if is_grease(*group) {
                        put_u16(&mut shares, grease.group());
                        put_u16(&mut shares, 1);
                        shares.push(0);
                        continue;
                    }
                    put_u16(&mut shares, *group);
                    let key_len: usize = match group {
                        0x001d => 32, // x25519
                        0x0017 => 65, // secp256r1, uncompressed point
                        0x0018 => 97, // secp384r1
                        0x11ec => 1216, // X25519MLKEM768
                        _ => 32,
                    };
                    put_u16(&mut shares, key_len as u16);
                    let mut key = vec![0u8; key_len];
                    rng.fill(&mut key);
                    if key_len == 65 || key_len == 97 {
                        key[0] = 0x04;
                    }
                    shares.extend_from_slice(&key);
                }
                put_u16(&mut out, shares.len() as u16);
                out.extend_from_slice(&shares);
            }
            Extension::ApplicationSettings(protocols) => {
                let total: usize = protocols.iter().map(|p| p.len() + 1).sum();
                put_u16(&mut out, total as u16);
                for protocol in protocols {
                    out.push(protocol.len() as u8);
                    out.extend_from_slice(protocol.as_bytes());
                }
            }
            Extension::EncryptedClientHello => {
                // GREASE ECH: outer client hello type, kdf/aead ids, one-byte
                // config id, empty enc, fixed-size payload.
                out.push(0); // outer
                put_u16(&mut out, 0x0001); // HKDF-SHA256
                put_u16(&mut out, 0x0001); // AES-128-GCM
                out.push((rng.next() & 0xff) as u8);
                put_u16(&mut out, 0);
                let mut payload = vec![0u8; 128];
                rng.fill(&mut payload);
                put_u16(&mut out, payload.len() as u16);
                out.extend_from_slice(&payload);
            }
            Extension::RenegotiationInfo => {
                out.push(0);
            }
            Extension::Grease(slot) => {
                if *slot > 0 {
                    out.push(0);
                }
            }
            Extension::Unknown(_, payload) => {
                out.extend_from_slice(payload);
            }
        }
        out
    }
}

pub(crate) fn is_grease(value: u16) -> bool {
    value & 0x0f0f == 0x0a0a && (value >> 8) == (value & 0xff)
}

fn join_ids(ids: impl Iterator<Item = u16>) -> String {
    let mut out = String::new();
    for (i, id) in ids.enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.push_str(&id.to_string());
    }
    out
}

// BoringSSL pads hellos whose unpadded length lands in (255, 511] up to 512.
fn padding_payload(unpadded_hello_len: usize) -> Vec<u8> {
    let with_header = unpadded_hello_len + 4;
    if with_header > 0xff && with_header < 0x200 {
        vec![0u8; 0x200 - with_header]
    } else {
        Vec::new()
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// GREASE values resolved for one encoding, per RFC 8701.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GreaseValues {
    base: u8,
}

impl GreaseValues {
    const ZERO: GreaseValues = GreaseValues { base: 0 };

    fn from_seed(seed: u64) -> Self {
        GreaseValues {
            base: (seed % 16) as u8,
        }
    }

    fn value(self, offset: u8) -> u16 {
        let nibble = u16::from((self.base + offset) % 16);
        let byte = (nibble << 4) | 0x0a;
        (byte << 8) | byte
    }

    fn cipher(self) -> u16 {
        self.value(0)
    }

    fn group(self) -> u16 {
        self.value(1)
    }

    fn version(self) -> u16 {
        self.value(2)
    }

    fn extension(self, slot: u8) -> u16 {
        self.value(3 + slot * 2)
    }
}

/// Deterministic generator for the canonical encoding's variable fields.
#[derive(Debug, Clone)]
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_spec() -> ClientHelloSpec {
        ClientHelloSpec {
            min_version: version::TLS12,
            max_version: version::TLS13,
            cipher_suites: vec![GREASE, 0x1301, 0x1302, 0xc02b],
            compression_methods: vec![0],
            extensions: vec![
                Extension::Grease(0),
                Extension::ServerName,
                Extension::ExtendedMasterSecret,
                Extension::SupportedGroups(vec![GREASE, 0x001d, 0x0017]),
                Extension::EcPointFormats(vec![0]),
                Extension::SupportedVersions(vec![GREASE, version::TLS13, version::TLS12]),
                Extension::KeyShare(vec![GREASE, 0x001d]),
                Extension::Alpn(vec!["h2".into(), "http/1.1".into()]),
                Extension::Grease(1),
            ],
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let spec = small_spec();
        assert_eq!(spec.encode("example.com"), spec.encode("example.com"));
    }

    #[test]
    fn sni_carries_the_host() {
        let bytes = small_spec().encode("api.example.org");
        let haystack = bytes.windows(b"api.example.org".len());
        assert!(haystack.into_iter().any(|w| w == b"api.example.org"));
    }

    #[test]
    fn ja3_excludes_grease() {
        let ja3 = small_spec().ja3();
        assert_eq!(ja3, "772,4865-4866-49195,0-23-10-11-43-51-16,29-23,0");
        assert_eq!(small_spec().ja3_hash().len(), 32);
    }

    #[test]
    fn grease_values_are_valid_grease() {
        let spec = small_spec();
        let grease = GreaseValues::from_seed(spec.seed());
        for value in [
            grease.cipher(),
            grease.group(),
            grease.version(),
            grease.extension(0),
            grease.extension(1),
        ] {
            assert!(is_grease(value), "{value:#06x} is not a GREASE value");
        }
    }

    #[test]
    fn grease_slots_differ() {
        let grease = GreaseValues::from_seed(7);
        assert_ne!(grease.extension(0), grease.extension(1));
        assert_ne!(grease.cipher(), grease.group());
    }
}
