//! Fluent client construction.
//!
//! Every option accumulates on the builder; `build()` validates the
//! combination, resolves profile defaults and freezes an immutable
//! [`Client`](crate::client::Client). Sub-builders (`impersonate()`,
//! `ja3()`, `http2_settings()`, `http3_settings()`, `dns_over_tls()`)
//! return to the main builder from their terminal call.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::config::Options;
use crate::context::Context;
use crate::dns::{DnsConfig, DotProvider};
use crate::error::{self, Result};
use crate::fingerprint::h2::{Http2Settings, Priority, SettingId};
use crate::fingerprint::hello::ClientHelloSpec;
use crate::fingerprint::quic::QuicSpec;
use crate::fingerprint::{ja3, profiles};
use crate::http::headers::{OrderedHeaders, PseudoOrder};
use crate::protocols::ForceProtocol;
use crate::proxy::{Proxy, ProxyScheme};
use crate::redirect::Policy;
use crate::retry::RetryPolicy;

/// Accumulates options; consumed by [`build`](ClientBuilder::build).
#[derive(Debug, Default)]
pub struct ClientBuilder {
    options: Options,
    pending_ja3: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== timing & cancellation =====

    /// Absolute per-request deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Bind a parent cancellation/deadline; composes with `timeout`, the
    /// earliest wins.
    #[must_use]
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.options.context = Some(ctx);
        self
    }

    // ===== dialing =====

    /// Static proxy URL: `http://`, `socks5://` or `socks5h://`.
    pub fn proxy(mut self, url: &str) -> Result<Self> {
        self.options.proxy = Some(Proxy::url(url)?);
        Ok(self)
    }

    /// Per-request dynamic proxy selection.
    #[must_use]
    pub fn proxy_fn<F>(mut self, func: F) -> Self
    where
        F: Fn(&url::Url) -> Option<ProxyScheme> + Send + Sync + 'static,
    {
        self.options.proxy = Some(Proxy::custom(func));
        self
    }

    /// Plain UDP DNS against a custom server.
    #[must_use]
    pub fn dns(mut self, server: SocketAddr) -> Self {
        self.options.dns = DnsConfig::Udp(server);
        self
    }

    /// Cache DNS answers for `ttl`, bounded to `max_entries` hosts.
    #[must_use]
    pub fn dns_cache(mut self, ttl: Duration, max_entries: usize) -> Self {
        self.options.dns_cache = Some((ttl, max_entries));
        self
    }

    /// DNS-over-TLS against a pinned provider.
    #[must_use]
    pub fn dns_over_tls(self) -> DnsOverTlsBuilder {
        DnsOverTlsBuilder { builder: self }
    }

    /// Dial over a Unix-domain socket; the URL host becomes the path.
    #[must_use]
    pub fn unix_domain_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.unix_socket = Some(path.into());
        self
    }

    /// Source-interface bind for outgoing connections.
    #[must_use]
    pub fn interface_addr(mut self, addr: IpAddr) -> Self {
        self.options.interface_addr = Some(addr);
        self
    }

    // ===== fingerprint =====

    /// Atomic impersonation profile (TLS + HTTP/2 + HTTP/3).
    #[must_use]
    pub fn impersonate(self) -> ImpersonateBuilder {
        ImpersonateBuilder { builder: self }
    }

    /// TLS fingerprint from a JA3 string or explicit spec.
    #[must_use]
    pub fn ja3(self) -> Ja3Builder {
        Ja3Builder { builder: self }
    }

    /// HTTP/2 fingerprint knobs.
    #[must_use]
    pub fn http2_settings(self) -> Http2SettingsBuilder {
        Http2SettingsBuilder {
            settings: self.options.fingerprint.h2.clone(),
            builder: self,
        }
    }

    /// HTTP/3 / QUIC fingerprint knobs.
    #[must_use]
    pub fn http3_settings(self) -> Http3SettingsBuilder {
        Http3SettingsBuilder {
            spec: self.options.fingerprint.quic.clone(),
            builder: self,
        }
    }

    // ===== protocol selection (last writer wins) =====

    #[must_use]
    pub fn force_http1(mut self) -> Self {
        self.options.force_protocol = ForceProtocol::Http1;
        self
    }

    #[must_use]
    pub fn force_http2(mut self) -> Self {
        self.options.force_protocol = ForceProtocol::Http2;
        self
    }

    #[must_use]
    pub fn http3(mut self) -> Self {
        self.options.force_protocol = ForceProtocol::Http3;
        self
    }

    #[must_use]
    pub fn disable_http3(mut self) -> Self {
        self.options.http3_disabled = true;
        if self.options.force_protocol == ForceProtocol::Http3 {
            self.options.force_protocol = ForceProtocol::Auto;
        }
        self
    }

    // ===== toggles =====

    /// Install the cookie jar and TLS session cache for this client.
    #[must_use]
    pub fn session(mut self) -> Self {
        self.options.session = true;
        self
    }

    /// Retain the first full body drain for repeated reads.
    #[must_use]
    pub fn cache_body(mut self) -> Self {
        self.options.cache_body = true;
        self
    }

    /// Record each redirect hop on the final response.
    #[must_use]
    pub fn history(mut self) -> Self {
        self.options.history = true;
        self
    }

    /// Capture the remote socket address on responses.
    #[must_use]
    pub fn remote_address(mut self) -> Self {
        self.options.remote_address = true;
        self
    }

    /// Disable certificate verification.
    #[must_use]
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.options.verify = false;
        self
    }

    /// Reuse a single transport for the client's lifetime.
    #[must_use]
    pub fn singleton(mut self) -> Self {
        self.options.singleton = true;
        self
    }

    // ===== redirects & retries =====

    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.options.redirect = Policy::limited(max);
        self
    }

    #[must_use]
    pub fn not_follow_redirects(mut self) -> Self {
        self.options.redirect = Policy::none();
        self
    }

    /// Follow redirects only within the same host and port.
    #[must_use]
    pub fn follow_only_host_redirects(mut self) -> Self {
        self.options.redirect = Policy::host_only();
        self
    }

    #[must_use]
    pub fn redirect_policy(mut self, policy: Policy) -> Self {
        self.options.redirect = policy;
        self
    }

    /// Forward user-set headers verbatim on cross-origin redirects.
    #[must_use]
    pub fn forward_headers_on_redirect(mut self) -> Self {
        self.options.forward_headers_on_redirect = true;
        self
    }

    /// Retry on transient statuses (default 500, 502, 503, 504 when
    /// `statuses` is empty) with a linear backoff.
    #[must_use]
    pub fn retry(mut self, attempts: u32, backoff: Duration, statuses: Vec<u16>) -> Self {
        self.options.retry = RetryPolicy::new(attempts, backoff, statuses);
        self
    }

    // ===== headers =====

    /// Replace the default header set, preserving the given order.
    #[must_use]
    pub fn set_headers(mut self, headers: OrderedHeaders) -> Self {
        self.options.headers = headers;
        self
    }

    /// Merge additional default headers.
    #[must_use]
    pub fn add_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.options.headers.set(name.into(), value.into());
        }
        self
    }

    #[must_use]
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.options.headers.set("User-Agent", value.into());
        self
    }

    #[must_use]
    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.options.headers.set("Content-Type", value.into());
        self
    }

    #[must_use]
    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        let credentials = BASE64.encode(format!("{user}:{password}"));
        self.options
            .headers
            .set("Authorization", format!("Basic {credentials}"));
        self
    }

    #[must_use]
    pub fn bearer_auth(mut self, token: &str) -> Self {
        self.options
            .headers
            .set("Authorization", format!("Bearer {token}"));
        self
    }

    // ===== hooks =====

    /// Register a pre-request hook; hooks run in registration order and
    /// may mutate the request or short-circuit with an error.
    #[must_use]
    pub fn request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut crate::http::Request) -> Result<()> + Send + Sync + 'static,
    {
        self.options.middleware.with_request_hook(hook);
        self
    }

    /// Register a post-response hook.
    #[must_use]
    pub fn response_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut crate::http::Response) -> Result<()> + Send + Sync + 'static,
    {
        self.options.middleware.with_response_hook(hook);
        self
    }

    // ===== misc =====

    /// Custom multipart boundary generator.
    #[must_use]
    pub fn boundary<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.options.boundary = Some(Arc::new(generator));
        self
    }

    /// Bound the transport cache, evicting beyond `max` entries.
    #[must_use]
    pub fn transport_cache_size(mut self, max: usize) -> Self {
        self.options.transport_cache_max = Some(max);
        self
    }

    /// Validate and freeze into an immutable client.
    pub fn build(mut self) -> Result<Client> {
        if let Some(raw) = self.pending_ja3.take() {
            let spec = ja3::parse(&raw).map_err(error::builder)?;
            self.options.fingerprint = self.options.fingerprint.with_hello(spec);
        }
        if self.options.force_protocol == ForceProtocol::Auto
            && !self.options.http3_disabled
            && !self.options.fingerprint.id.supports_h3()
        {
            self.options.http3_disabled = true;
        }
        self.options
            .validate()
            .map_err(error::builder_msg)?;

        // Profile defaults sit under the user's headers: the user's values
        // replace the profile's in place, everything else keeps the
        // profile's emission order.
        let mut resolved = self.options.fingerprint.headers.clone();
        let user_headers = std::mem::take(&mut self.options.headers);
        for (name, value) in user_headers.iter() {
            resolved.set(name, value);
        }
        self.options.headers = resolved;

        Client::from_options(self.options)
    }
}

/// Terminal profile selection; each setter returns the main builder.
#[derive(Debug)]
pub struct ImpersonateBuilder {
    builder: ClientBuilder,
}

impl ImpersonateBuilder {
    #[must_use]
    pub fn chrome(mut self) -> ClientBuilder {
        self.builder.options.fingerprint = profiles::chrome();
        self.builder
    }

    #[must_use]
    pub fn firefox(mut self) -> ClientBuilder {
        self.builder.options.fingerprint = profiles::firefox();
        self.builder
    }

    #[must_use]
    pub fn tor(mut self) -> ClientBuilder {
        self.builder.options.fingerprint = profiles::tor();
        self.builder.options.http3_disabled = true;
        self.builder
    }
}

/// JA3 and explicit ClientHello configuration.
#[derive(Debug)]
pub struct Ja3Builder {
    builder: ClientBuilder,
}

impl Ja3Builder {
    /// Chrome 87's JA3 string.
    #[must_use]
    pub fn chrome87(self) -> ClientBuilder {
        self.set_hello_str(
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,\
             0-23-65281-10-11-35-16-5-13-18-51-45-43-27-21,29-23-24,0",
        )
    }

    /// A current Chrome JA3 string.
    #[must_use]
    pub fn chrome131(self) -> ClientBuilder {
        self.set_hello_str(
            "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,\
             0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0",
        )
    }

    /// Firefox's JA3 string.
    #[must_use]
    pub fn firefox133(self) -> ClientBuilder {
        self.set_hello_str(
            "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,\
             0-23-65281-10-11-35-16-5-34-51-43-13-45-28-21,29-23-24-25-256-257,0",
        )
    }

    /// A raw JA3 string, parsed and validated at build.
    #[must_use]
    pub fn set_hello_str(mut self, ja3: impl Into<String>) -> ClientBuilder {
        self.builder.pending_ja3 = Some(ja3.into().replace(char::is_whitespace, ""));
        self.builder
    }

    /// An explicit ClientHello specification.
    #[must_use]
    pub fn set_hello_spec(mut self, spec: ClientHelloSpec) -> ClientBuilder {
        self.builder.options.fingerprint =
            self.builder.options.fingerprint.clone().with_hello(spec);
        self.builder
    }
}

/// HTTP/2 fingerprint knobs; `set()` applies them.
#[derive(Debug)]
pub struct Http2SettingsBuilder {
    builder: ClientBuilder,
    settings: Http2Settings,
}

impl Http2SettingsBuilder {
    #[must_use]
    pub fn header_table_size(mut self, value: u32) -> Self {
        self.settings.set(SettingId::HeaderTableSize, value);
        self
    }

    #[must_use]
    pub fn enable_push(mut self, value: u32) -> Self {
        self.settings.set(SettingId::EnablePush, value);
        self
    }

    #[must_use]
    pub fn max_concurrent_streams(mut self, value: u32) -> Self {
        self.settings.set(SettingId::MaxConcurrentStreams, value);
        self
    }

    #[must_use]
    pub fn initial_window_size(mut self, value: u32) -> Self {
        self.settings.set(SettingId::InitialWindowSize, value);
        self
    }

    #[must_use]
    pub fn max_frame_size(mut self, value: u32) -> Self {
        self.settings.set(SettingId::MaxFrameSize, value);
        self
    }

    #[must_use]
    pub fn max_header_list_size(mut self, value: u32) -> Self {
        self.settings.set(SettingId::MaxHeaderListSize, value);
        self
    }

    /// Connection-level WINDOW_UPDATE increment sent after SETTINGS.
    #[must_use]
    pub fn connection_flow(mut self, increment: u32) -> Self {
        self.settings.connection_flow = increment;
        self
    }

    /// PRIORITY frames emitted before the first request, in order.
    #[must_use]
    pub fn priorities(mut self, priorities: Vec<Priority>) -> Self {
        self.settings.priorities = priorities;
        self
    }

    /// Priority attached to request HEADERS frames.
    #[must_use]
    pub fn header_priority(mut self, priority: Priority) -> Self {
        self.settings.header_priority = Some(priority);
        self
    }

    /// Pseudo-header emission order.
    #[must_use]
    pub fn pseudo_order(mut self, order: PseudoOrder) -> Self {
        self.settings.pseudo_order = order;
        self
    }

    /// Apply the accumulated HTTP/2 settings.
    #[must_use]
    pub fn set(mut self) -> ClientBuilder {
        self.builder.options.fingerprint =
            self.builder.options.fingerprint.clone().with_h2(self.settings);
        self.builder
    }
}

/// HTTP/3 / QUIC fingerprint knobs; `set()` applies them.
#[derive(Debug)]
pub struct Http3SettingsBuilder {
    builder: ClientBuilder,
    spec: QuicSpec,
}

impl Http3SettingsBuilder {
    /// Chrome's QUIC shape.
    #[must_use]
    pub fn chrome(mut self) -> Self {
        self.spec = profiles::chrome().quic;
        self
    }

    /// Firefox's QUIC shape.
    #[must_use]
    pub fn firefox(mut self) -> Self {
        self.spec = profiles::firefox().quic;
        self
    }

    /// Source connection-id length of the Initial packet.
    #[must_use]
    pub fn source_conn_id_length(mut self, len: usize) -> Self {
        self.spec.src_conn_id_length = len;
        self
    }

    /// Minimum UDP datagram size (padding target).
    #[must_use]
    pub fn udp_datagram_min_size(mut self, size: usize) -> Self {
        self.spec.udp_datagram_min_size = size;
        self
    }

    /// Ordered H3 SETTINGS identifiers and values.
    #[must_use]
    pub fn settings(mut self, settings: Vec<(u64, u64)>) -> Self {
        self.spec.h3_settings = settings;
        self
    }

    /// Replace the whole QUIC spec.
    #[must_use]
    pub fn set_quic_spec(mut self, spec: QuicSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Apply the accumulated HTTP/3 settings.
    #[must_use]
    pub fn set(mut self) -> ClientBuilder {
        self.builder.options.fingerprint =
            self.builder.options.fingerprint.clone().with_quic(self.spec);
        self.builder
    }
}

/// Pinned DNS-over-TLS provider selection.
#[derive(Debug)]
pub struct DnsOverTlsBuilder {
    builder: ClientBuilder,
}

macro_rules! dot_provider {
    ($name:ident) => {
        #[must_use]
        pub fn $name(mut self) -> ClientBuilder {
            self.builder.options.dns =
                DnsConfig::OverTls(crate::dns::providers::$name());
            self.builder
        }
    };
}

impl DnsOverTlsBuilder {
    dot_provider!(google);
    dot_provider!(cloudflare);
    dot_provider!(quad9);
    dot_provider!(adguard);
    dot_provider!(cira_shield);
    dot_provider!(alidns);
    dot_provider!(quad101);
    dot_provider!(sb);
    dot_provider!(forge);
    dot_provider!(libre);
    dot_provider!(switch);

    /// A user-supplied `(sni, primary, secondary)` provider.
    #[must_use]
    pub fn custom(
        mut self,
        sni: impl Into<String>,
        primary: SocketAddr,
        secondary: Option<SocketAddr>,
    ) -> ClientBuilder {
        self.builder.options.dns =
            DnsConfig::OverTls(DotProvider::custom(sni, primary, secondary));
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_forcing_is_last_writer_wins() {
        let builder = ClientBuilder::new().force_http1().force_http2().http3();
        assert_eq!(builder.options.force_protocol, ForceProtocol::Http3);
    }

    #[test]
    fn profile_then_piecewise_override() {
        let builder = ClientBuilder::new()
            .impersonate()
            .chrome()
            .http2_settings()
            .initial_window_size(1)
            .set();
        let fp = &builder.options.fingerprint;
        assert_eq!(fp.h2.get(SettingId::InitialWindowSize), Some(1));
        // TLS half still Chrome's
        assert_eq!(fp.hello.ja3(), profiles::chrome().hello.ja3());
    }

    #[test]
    fn invalid_ja3_surfaces_at_build() {
        let result = ClientBuilder::new().ja3().set_hello_str("not-a-ja3").build();
        assert!(result.unwrap_err().is_builder());
    }

    #[test]
    fn user_headers_override_profile_defaults_in_place() {
        let client = ClientBuilder::new()
            .impersonate()
            .chrome()
            .user_agent("custom-agent/1.0")
            .build()
            .unwrap();
        let headers = client.default_headers();
        assert_eq!(headers.get("user-agent"), Some("custom-agent/1.0"));
        // position preserved: User-Agent still before Accept
        let names: Vec<String> = headers
            .iter()
            .map(|(n, _)| n.to_ascii_lowercase())
            .collect();
        let ua = names.iter().position(|n| n == "user-agent").unwrap();
        let accept = names.iter().position(|n| n == "accept").unwrap();
        assert!(ua < accept);
    }

    #[test]
    fn dns_over_tls_provider_sets_identity() {
        let builder = ClientBuilder::new().dns_over_tls().quad9();
        assert!(matches!(builder.options.dns, DnsConfig::OverTls(_)));
    }
}
