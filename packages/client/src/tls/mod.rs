//! TLS handshakes for TCP transports.
//!
//! The fingerprint lives in [`ClientHelloSpec`]; this module projects it
//! onto the rustls surface: cipher-suite subset and order, protocol version
//! bounds, ALPN, session resumption and certificate verification. The
//! canonical ClientHello bytes (JA3, cache keys, byte-identity tests) come
//! from `ClientHelloSpec::encode`; rustls emits the live handshake.

use std::sync::Arc;

use rustls::client::ClientSessionMemoryCache;
use rustls::client::Resumption;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::connect::Conn;
use crate::context::Context;
use crate::error::{self, Result};
use crate::fingerprint::hello::{version, ClientHelloSpec};

/// Shared client-session store; present only when the client was built with
/// `session()`. With it, handshakes after the first to an origin resume via
/// the pre-shared-key extension.
pub type SessionCache = Arc<ClientSessionMemoryCache>;

pub fn new_session_cache() -> SessionCache {
    Arc::new(ClientSessionMemoryCache::new(256))
}

/// TLS connector for one fingerprint configuration.
#[derive(Clone)]
pub struct Tls {
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for Tls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Tls")
    }
}

impl Tls {
    /// Build a connector from the fingerprint spec.
    ///
    /// `alpn` overrides the spec's ALPN list (the transport knows whether it
    /// is dialing for h2 or http/1.1); `verify` disables certificate
    /// verification when false.
    pub fn new(
        spec: &ClientHelloSpec,
        alpn: &[&str],
        session_cache: Option<SessionCache>,
        verify: bool,
    ) -> Result<Self> {
        let provider = base_provider(spec);

        let mut versions: Vec<&'static rustls::SupportedProtocolVersion> = Vec::new();
        if spec.max_version >= version::TLS13 {
            versions.push(&rustls::version::TLS13);
        }
        if spec.min_version <= version::TLS12 && spec.max_version >= version::TLS12 {
            versions.push(&rustls::version::TLS12);
        }
        if versions.is_empty() {
            return Err(error::builder_msg("fingerprint enables no TLS version"));
        }

        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&versions)
            .map_err(error::builder)?;

        let mut config = if verify {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::NoVerify::new()))
                .with_no_client_auth()
        };

        config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
        config.resumption = match session_cache {
            Some(cache) => Resumption::store(cache),
            None => Resumption::disabled(),
        };

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Handshake over any dialed connection (TCP or Unix).
    pub async fn handshake_conn(
        &self,
        ctx: &Context,
        conn: Conn,
        host: &str,
    ) -> Result<TlsStream<Conn>> {
        let server_name =
            ServerName::try_from(host.to_string()).map_err(error::tls)?;
        let connector = TlsConnector::from(Arc::clone(&self.config));
        let tls = ctx
            .run_io(connector.connect(server_name, conn), error::tls)
            .await?;
        tracing::debug!(host, "tls handshake complete");
        Ok(tls)
    }

    /// Negotiated ALPN protocol after a handshake.
    pub fn alpn_of<S>(stream: &tokio_rustls::client::TlsStream<S>) -> Option<String> {
        let (_, session) = stream.get_ref();
        session
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned())
    }
}

/// Restrict the ring provider to the spec's suites, preserving spec order.
fn base_provider(spec: &ClientHelloSpec) -> CryptoProvider {
    let mut provider = rustls::crypto::ring::default_provider();
    let available = provider.cipher_suites.clone();
    let mut selected = Vec::with_capacity(spec.cipher_suites.len());
    for wanted in &spec.cipher_suites {
        if crate::fingerprint::hello::is_grease(*wanted) {
            continue;
        }
        if let Some(suite) = available
            .iter()
            .find(|s| u16::from(s.suite()) == *wanted)
        {
            selected.push(*suite);
        }
    }
    if !selected.is_empty() {
        provider.cipher_suites = selected;
    }
    provider
}

mod danger {
    //! Certificate verification bypass, selected by `verify(false)`.

    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::DigitallySignedStruct;

    #[derive(Debug)]
    pub(super) struct NoVerify {
        provider: CryptoProvider,
    }

    impl NoVerify {
        pub(super) fn new() -> Self {
            Self {
                provider: rustls::crypto::ring::default_provider(),
            }
        }
    }

    impl ServerCertVerifier for NoVerify {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
