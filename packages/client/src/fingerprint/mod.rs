//! Browser fingerprint assembly.
//!
//! A [`Fingerprint`] joins the three protocol-level halves of an
//! impersonation target (TLS ClientHello, HTTP/2 connection shape, QUIC/H3
//! Initial shape) with the default header set of that browser build.
//! Profiles set all of them atomically; later piecewise setters override
//! individual halves without disturbing the rest.

pub mod h2;
pub mod hello;
pub mod ja3;
pub mod profiles;
pub mod quic;

use crate::http::headers::OrderedHeaders;

pub use h2::Http2Settings;
pub use hello::ClientHelloSpec;
pub use quic::QuicSpec;

/// Identity of the impersonated browser build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileId {
    Chrome(u16),
    Firefox(u16),
    Tor,
    Custom,
}

impl ProfileId {
    /// Stable text used in transport-cache keys.
    pub fn key(&self) -> String {
        match self {
            ProfileId::Chrome(v) => format!("chrome/{v}"),
            ProfileId::Firefox(v) => format!("firefox/{v}"),
            ProfileId::Tor => "tor".to_string(),
            ProfileId::Custom => "custom".to_string(),
        }
    }

    /// Whether the profile speaks HTTP/3 at all.
    pub fn supports_h3(&self) -> bool {
        !matches!(self, ProfileId::Tor)
    }
}

/// The joint TLS + HTTP/2 + HTTP/3 configuration of a browser build.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub id: ProfileId,
    pub hello: ClientHelloSpec,
    pub h2: Http2Settings,
    pub quic: QuicSpec,
    /// Default request headers of the build, in browser emission order.
    pub headers: OrderedHeaders,
}

impl Default for Fingerprint {
    fn default() -> Self {
        profiles::chrome()
    }
}

impl Fingerprint {
    /// Replace the TLS half, marking the fingerprint custom. The embedded
    /// QUIC hello follows, keeping TCP and QUIC handshakes consistent the
    /// way a real build's are.
    pub fn with_hello(mut self, hello: ClientHelloSpec) -> Self {
        self.quic.hello = hello.clone();
        self.hello = hello;
        self.id = ProfileId::Custom;
        self
    }

    /// Replace the HTTP/2 half.
    pub fn with_h2(mut self, h2: Http2Settings) -> Self {
        self.h2 = h2;
        self.id = ProfileId::Custom;
        self
    }

    /// Replace the QUIC/H3 half.
    pub fn with_quic(mut self, quic: QuicSpec) -> Self {
        self.quic = quic;
        self.id = ProfileId::Custom;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_override_follows_into_quic() {
        let custom = ja3::parse("771,4865,0-10-11,29-23,0").unwrap();
        let fp = profiles::chrome().with_hello(custom.clone());
        assert_eq!(fp.hello, custom);
        assert_eq!(fp.quic.hello, custom);
        assert_eq!(fp.id, ProfileId::Custom);
        // the H2 half keeps the profile's shape
        assert_eq!(fp.h2, profiles::chrome().h2);
    }
}
