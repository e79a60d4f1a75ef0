//! Client configuration accumulated by the builder and frozen at build.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::context::Context;
use crate::dns::DnsConfig;
use crate::fingerprint::Fingerprint;
use crate::http::headers::OrderedHeaders;
use crate::middleware::Middleware;
use crate::multipart::BoundaryGenerator;
use crate::protocols::ForceProtocol;
use crate::proxy::Proxy;
use crate::redirect::Policy;
use crate::retry::RetryPolicy;

/// Every knob of the fluent surface, in one record. Read-only after build.
#[derive(Clone)]
pub struct Options {
    /// Absolute per-request deadline.
    pub timeout: Option<Duration>,
    /// Parent cancellation/deadline bound with `with_context`.
    pub context: Option<Context>,
    pub proxy: Option<Proxy>,
    pub dns: DnsConfig,
    /// `(ttl, max_entries)` for the DNS cache; `None` disables it.
    pub dns_cache: Option<(Duration, usize)>,
    pub unix_socket: Option<PathBuf>,
    pub fingerprint: Fingerprint,
    pub force_protocol: ForceProtocol,
    /// Profile H3 support can be revoked explicitly.
    pub http3_disabled: bool,
    pub interface_addr: Option<IpAddr>,
    pub session: bool,
    pub cache_body: bool,
    pub history: bool,
    pub remote_address: bool,
    pub redirect: Policy,
    pub forward_headers_on_redirect: bool,
    pub retry: RetryPolicy,
    /// User-set default headers; merged over the profile's set at build.
    pub headers: OrderedHeaders,
    pub boundary: Option<BoundaryGenerator>,
    pub singleton: bool,
    /// Certificate verification; disabled only deliberately.
    pub verify: bool,
    pub transport_cache_max: Option<usize>,
    /// Pre-request and post-response hook chains.
    pub middleware: Middleware,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: None,
            context: None,
            proxy: None,
            dns: DnsConfig::default(),
            dns_cache: None,
            unix_socket: None,
            fingerprint: Fingerprint::default(),
            force_protocol: ForceProtocol::default(),
            http3_disabled: false,
            interface_addr: None,
            session: false,
            cache_body: false,
            history: false,
            remote_address: false,
            redirect: Policy::default(),
            forward_headers_on_redirect: false,
            retry: RetryPolicy::default(),
            headers: OrderedHeaders::new(),
            boundary: None,
            singleton: false,
            verify: true,
            transport_cache_max: None,
            middleware: Middleware::default(),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .field("dns", &self.dns)
            .field("force_protocol", &self.force_protocol)
            .field("fingerprint", &self.fingerprint.id)
            .field("session", &self.session)
            .field("redirect", &self.redirect)
            .field("singleton", &self.singleton)
            .finish_non_exhaustive()
    }
}

impl Options {
    /// Cross-option validation run at build.
    pub fn validate(&self) -> Result<(), String> {
        if self.force_protocol == ForceProtocol::Http3 {
            if self.http3_disabled {
                return Err("HTTP/3 is both forced and disabled".to_string());
            }
            if !self.fingerprint.id.supports_h3() {
                return Err(format!(
                    "profile {} does not speak HTTP/3",
                    self.fingerprint.id.key()
                ));
            }
            if self.unix_socket.is_some() {
                return Err("HTTP/3 cannot run over a unix socket".to_string());
            }
            if let Some(proxy) = &self.proxy {
                if let crate::proxy::Proxy::Static(crate::proxy::ProxyScheme::Http { .. }) = proxy {
                    return Err(
                        "HTTP CONNECT proxies cannot carry QUIC; use socks5 or drop HTTP3"
                            .to_string(),
                    );
                }
            }
        }
        if let Some((ttl, max)) = self.dns_cache {
            if ttl.is_zero() || max == 0 {
                return Err("DNS cache needs a non-zero ttl and capacity".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::profiles;

    #[test]
    fn default_options_validate() {
        let options = Options {
            verify: true,
            ..Options::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn forced_h3_over_http_proxy_is_rejected() {
        let options = Options {
            force_protocol: ForceProtocol::Http3,
            proxy: Some(Proxy::url("http://proxy.test:8080").unwrap()),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn tor_profile_refuses_forced_h3() {
        let options = Options {
            force_protocol: ForceProtocol::Http3,
            fingerprint: profiles::tor(),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn zero_dns_cache_is_rejected() {
        let options = Options {
            dns_cache: Some((Duration::ZERO, 16)),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }
}
