//! Transport assembly: protocol selection, connection reuse and the
//! fingerprint-keyed transport cache.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use http::{Method, StatusCode};
use url::Url;

use super::{h1, h2, h3};
use crate::connect::Dialer;
use crate::context::Context;
use crate::error::{self, Result};
use crate::fingerprint::Fingerprint;
use crate::http::headers::{OrderedHeaders, PseudoId};
use crate::proxy::ProxyScheme;
use crate::tls::{SessionCache, Tls};

/// Protocol forcing; last writer wins in the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceProtocol {
    #[default]
    Auto,
    Http1,
    Http2,
    Http3,
}

impl ForceProtocol {
    fn key(self) -> &'static str {
        match self {
            ForceProtocol::Auto => "auto",
            ForceProtocol::Http1 => "h1",
            ForceProtocol::Http2 => "h2",
            ForceProtocol::Http3 => "h3",
        }
    }
}

/// Everything a transport needs to emit one request.
#[derive(Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: OrderedHeaders,
    pub body: Option<Bytes>,
}

pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: OrderedHeaders,
    pub protocol: &'static str,
    pub remote_addr: Option<SocketAddr>,
    pub body: TransportBody,
}

/// Protocol-specific lazy body stream.
pub enum TransportBody {
    Empty,
    H1(h1::H1Body),
    H2(h2::H2Body),
    H3(h3::H3Body),
    #[cfg(test)]
    Chunks(std::vec::IntoIter<Bytes>),
}

impl TransportBody {
    pub async fn next_chunk(&mut self, ctx: &Context) -> Result<Option<Bytes>> {
        match self {
            TransportBody::Empty => Ok(None),
            TransportBody::H1(body) => body.next_chunk(ctx).await,
            TransportBody::H2(body) => body.next_chunk(ctx).await,
            TransportBody::H3(body) => body.next_chunk(ctx).await,
            #[cfg(test)]
            TransportBody::Chunks(chunks) => Ok(chunks.next()),
        }
    }
}

/// A compiled transport: fingerprint + dial path + parked connections.
pub struct Transport {
    fingerprint: Arc<Fingerprint>,
    dialer: Dialer,
    proxy: Option<ProxyScheme>,
    force: ForceProtocol,
    verify: bool,
    session_cache: Option<SessionCache>,
    h1_slot: h1::SenderSlot,
    h2_slot: h2::ConnectionSlot,
    h3_slot: Arc<Mutex<Option<h3::H3Connection>>>,
    h3_remote: Mutex<Option<SocketAddr>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("force", &self.force)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl Transport {
    pub fn new(
        fingerprint: Arc<Fingerprint>,
        dialer: Dialer,
        proxy: Option<ProxyScheme>,
        force: ForceProtocol,
        verify: bool,
        session_cache: Option<SessionCache>,
    ) -> Self {
        Self {
            fingerprint,
            dialer,
            proxy,
            force,
            verify,
            session_cache,
            h1_slot: Arc::new(Mutex::new(None)),
            h2_slot: Arc::new(Mutex::new(None)),
            h3_slot: Arc::new(Mutex::new(None)),
            h3_remote: Mutex::new(None),
        }
    }

    /// Drain parked HTTP/1 and HTTP/2 connections; close the HTTP/3 session.
    pub fn close_idle(&self) {
        self.h1_slot.lock().expect("h1 slot").take();
        self.h2_slot.lock().expect("h2 slot").take();
        if let Some(mut conn) = self.h3_slot.lock().expect("h3 slot").take() {
            conn.close();
        }
    }

    pub async fn execute(&self, ctx: &Context, req: TransportRequest) -> Result<TransportResponse> {
        let host = req
            .url
            .host_str()
            .map(str::to_string)
            .or_else(|| req.url.path().split('/').next().map(str::to_string))
            .ok_or_else(|| error::builder_msg("request URL has no host"))?;
        let port = req
            .url
            .port_or_known_default()
            .unwrap_or(if req.url.scheme() == "http" { 80 } else { 443 });

        match self.force {
            ForceProtocol::Http3 => self.execute_h3(ctx, &host, port, req).await,
            _ => self.execute_tcp(ctx, &host, port, req).await,
        }
    }

    async fn execute_h3(
        &self,
        ctx: &Context,
        host: &str,
        port: u16,
        req: TransportRequest,
    ) -> Result<TransportResponse> {
        let parked = self.h3_slot.lock().expect("h3 slot").take();
        let mut conn = match parked.filter(|c| c.is_usable()) {
            Some(conn) => conn,
            None => {
                let path = self
                    .dialer
                    .dial_udp(ctx, host, port, self.proxy.as_ref())
                    .await?;
                *self.h3_remote.lock().expect("h3 remote") = Some(path.target);
                h3::H3Connection::establish(ctx, path, host, &self.fingerprint.quic, self.verify)
                    .await?
            }
        };

        let fields = field_list(&req.method, &req.url, &req.headers, &self.fingerprint);
        let stream_id = conn
            .send_request(ctx, &fields, req.body.as_deref())
            .await?;
        let head = conn.read_response(ctx, stream_id).await?;
        let remote_addr = *self.h3_remote.lock().expect("h3 remote");

        Ok(TransportResponse {
            status: head.status,
            headers: head.headers,
            protocol: "HTTP/3.0",
            remote_addr,
            body: TransportBody::H3(h3::H3Body::new(conn, stream_id, Arc::clone(&self.h3_slot))),
        })
    }

    async fn execute_tcp(
        &self,
        ctx: &Context,
        host: &str,
        port: u16,
        req: TransportRequest,
    ) -> Result<TransportResponse> {
        // Reuse a parked connection before dialing a new one.
        let parked_h2 = self.h2_slot.lock().expect("h2 slot").take();
        if let Some(conn) = parked_h2.filter(|c| c.is_usable()) {
            return self.exchange_h2(ctx, conn, req, None).await;
        }
        let parked_h1 = self.h1_slot.lock().expect("h1 slot").take();
        if let Some(sender) = parked_h1.filter(|s| s.is_ready()) {
            let (head, body) = h1::send_request(
                ctx,
                sender,
                &req.method,
                &req.url,
                &req.headers,
                req.body,
                Arc::clone(&self.h1_slot),
            )
            .await?;
            return Ok(TransportResponse {
                status: head.status,
                headers: head.headers,
                protocol: "HTTP/1.1",
                remote_addr: None,
                body: TransportBody::H1(body),
            });
        }

        let conn = self
            .dialer
            .dial(ctx, host, port, self.proxy.as_ref())
            .await?;
        let remote_addr = conn.peer_addr();

        if req.url.scheme() == "https" {
            let alpn: &[&str] = match self.force {
                ForceProtocol::Http1 => &["http/1.1"],
                ForceProtocol::Http2 => &["h2"],
                _ => &["h2", "http/1.1"],
            };
            let tls = Tls::new(
                &self.fingerprint.hello,
                alpn,
                self.session_cache.clone(),
                self.verify,
            )?;
            let stream = tls.handshake_conn(ctx, conn, host).await?;
            let negotiated = Tls::alpn_of(&stream);
            if negotiated.as_deref() == Some("h2") {
                let conn =
                    h2::H2Connection::handshake(ctx, stream, self.fingerprint.h2.clone()).await?;
                return self.exchange_h2(ctx, conn, req, remote_addr).await;
            }
            let sender = h1::handshake(ctx, stream).await?;
            let (head, body) = h1::send_request(
                ctx,
                sender,
                &req.method,
                &req.url,
                &req.headers,
                req.body,
                Arc::clone(&self.h1_slot),
            )
            .await?;
            return Ok(TransportResponse {
                status: head.status,
                headers: head.headers,
                protocol: "HTTP/1.1",
                remote_addr,
                body: TransportBody::H1(body),
            });
        }

        // Plain-text: HTTP/2 only with prior knowledge, otherwise HTTP/1.1.
        if self.force == ForceProtocol::Http2 {
            let conn = h2::H2Connection::handshake(ctx, conn, self.fingerprint.h2.clone()).await?;
            return self.exchange_h2(ctx, conn, req, remote_addr).await;
        }
        let sender = h1::handshake(ctx, conn).await?;
        let (head, body) = h1::send_request(
            ctx,
            sender,
            &req.method,
            &req.url,
            &req.headers,
            req.body,
            Arc::clone(&self.h1_slot),
        )
        .await?;
        Ok(TransportResponse {
            status: head.status,
            headers: head.headers,
            protocol: "HTTP/1.1",
            remote_addr,
            body: TransportBody::H1(body),
        })
    }

    async fn exchange_h2(
        &self,
        ctx: &Context,
        conn: h2::H2Connection,
        req: TransportRequest,
        remote_addr: Option<SocketAddr>,
    ) -> Result<TransportResponse> {
        let fields = field_list(&req.method, &req.url, &req.headers, &self.fingerprint);
        let (head, body) = conn
            .send_request(ctx, fields, req.body, Arc::clone(&self.h2_slot))
            .await?;
        Ok(TransportResponse {
            status: head.status,
            headers: head.headers,
            protocol: "HTTP/2.0",
            remote_addr,
            body: TransportBody::H2(body),
        })
    }
}

/// Pseudo-headers in the fingerprint's permutation, then regular headers in
/// insertion order. Connection-specific HTTP/1 headers are dropped, as they
/// are forbidden on framed protocols.
pub(crate) fn field_list(
    method: &Method,
    url: &Url,
    headers: &OrderedHeaders,
    fingerprint: &Fingerprint,
) -> Vec<(String, String)> {
    let authority = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    let mut fields = Vec::with_capacity(4 + headers.len());
    for id in fingerprint.h2.pseudo_order.0 {
        let (name, value) = match id {
            PseudoId::Method => (":method", method.as_str().to_string()),
            PseudoId::Authority => (":authority", authority.clone()),
            PseudoId::Scheme => (":scheme", url.scheme().to_string()),
            PseudoId::Path => (":path", path.clone()),
        };
        fields.push((name.to_string(), value));
    }
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("connection")
            || name.eq_ignore_ascii_case("keep-alive")
            || name.eq_ignore_ascii_case("proxy-connection")
            || name.eq_ignore_ascii_case("transfer-encoding")
            || name.eq_ignore_ascii_case("upgrade")
        {
            continue;
        }
        fields.push((name.to_ascii_lowercase(), value.to_string()));
    }
    fields
}

/// Content-hashed transport cache.
#[derive(Debug)]
pub struct TransportCache {
    entries: DashMap<String, Arc<Transport>>,
    max_entries: Option<usize>,
}

impl TransportCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn get_or_insert_with<F>(&self, key: String, build: F) -> Arc<Transport>
    where
        F: FnOnce() -> Transport,
    {
        if let Some(existing) = self.entries.get(&key) {
            return Arc::clone(existing.value());
        }
        if let Some(max) = self.max_entries {
            while self.entries.len() >= max {
                let victim = self.entries.iter().next().map(|e| e.key().clone());
                match victim {
                    Some(victim) => {
                        self.entries.remove(&victim);
                    }
                    None => break,
                }
            }
        }
        let transport = Arc::new(build());
        self.entries.insert(key, Arc::clone(&transport));
        transport
    }

    /// Explicit eviction of every compiled transport.
    pub fn clear(&self) {
        for entry in self.entries.iter() {
            entry.value().close_idle();
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content hash over everything that makes two transports interchangeable.
pub(crate) fn transport_key(
    fingerprint: &Fingerprint,
    proxy: &str,
    dns: &str,
    force: ForceProtocol,
    unix_socket: Option<&PathBuf>,
) -> String {
    let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
    ctx.update(fingerprint.id.key().as_bytes());
    ctx.update(&fingerprint.hello.encode("fingerprint.invalid"));
    ctx.update(&fingerprint.h2.cache_key_bytes());
    ctx.update(&fingerprint.quic.cache_key_bytes());
    ctx.update(proxy.as_bytes());
    ctx.update(dns.as_bytes());
    ctx.update(force.key().as_bytes());
    if let Some(path) = unix_socket {
        ctx.update(path.to_string_lossy().as_bytes());
    }
    hex::encode(ctx.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::profiles;
    use crate::http::headers::OrderedHeaders;

    #[test]
    fn field_list_follows_pseudo_permutation() {
        let fp = profiles::firefox();
        let url = Url::parse("https://example.com/a?b=1").unwrap();
        let mut headers = OrderedHeaders::new();
        headers.append("X-One", "1");
        headers.append("Host", "ignored.example");
        headers.append("X-Two", "2");

        let fields = field_list(&Method::GET, &url, &headers, &fp);
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![":method", ":path", ":authority", ":scheme", "x-one", "x-two"]
        );
        assert_eq!(fields[1].1, "/a?b=1");
    }

    #[test]
    fn transport_key_is_stable_and_sensitive() {
        let fp = profiles::chrome();
        let a = transport_key(&fp, "direct", "system", ForceProtocol::Auto, None);
        let b = transport_key(&fp, "direct", "system", ForceProtocol::Auto, None);
        assert_eq!(a, b);

        let c = transport_key(&fp, "direct", "system", ForceProtocol::Http2, None);
        assert_ne!(a, c);

        let firefox = profiles::firefox();
        let d = transport_key(&firefox, "direct", "system", ForceProtocol::Auto, None);
        assert_ne!(a, d);
    }
}
