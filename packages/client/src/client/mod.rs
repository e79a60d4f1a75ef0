//! The frozen client and its request pipeline.
//!
//! `Client` is immutable after build and safe for concurrent use; the
//! transport cache, DNS cache, cookie jar, TLS session cache and the body
//! buffer pool live behind it. The pipeline runs hooks, acquires a
//! transport, and loops through the redirect and retry engines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use http::Method;
use url::Url;

use crate::config::Options;
use crate::connect::Dialer;
use crate::context::Context;
use crate::cookie::{CookieStore, Jar};
use crate::dns::Resolve;
use crate::error::{self, Result};
use crate::fingerprint::Fingerprint;
use crate::http::headers::OrderedHeaders;
use crate::http::response::{Body, BufferPool, Encoding, HistoryEntry};
use crate::http::{IntoUrl, Request, Response};
use crate::multipart::Form;
use crate::protocols::{
    transport::transport_key, ForceProtocol, Transport, TransportCache, TransportRequest,
};
use crate::redirect::{self, Action};
use crate::tls::{new_session_cache, SessionCache};

/// Request counters, in the style of the transport stats the engine keeps.
#[derive(Debug, Default)]
pub struct ClientStats {
    pub total_requests: AtomicU64,
    pub retries: AtomicU64,
    pub redirects_followed: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub retries: u64,
    pub redirects_followed: u64,
}

struct Inner {
    options: Options,
    fingerprint: Arc<Fingerprint>,
    resolver: Arc<dyn Resolve>,
    dialer: Dialer,
    transports: TransportCache,
    singleton: Mutex<Option<Arc<Transport>>>,
    jar: Option<Arc<Jar>>,
    session_cache: Option<SessionCache>,
    pool: Arc<BufferPool>,
    stats: ClientStats,
}

/// An immutable, cheaply clonable HTTP client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Client {
    /// Freeze an option set into a client. Used by the builder.
    pub(crate) fn from_options(options: Options) -> Result<Self> {
        let resolver = options.dns.build(options.dns_cache);
        let dialer = Dialer::new(
            Arc::clone(&resolver),
            options.interface_addr,
            options.unix_socket.clone(),
        );
        let jar = options.session.then(|| Arc::new(Jar::default()));
        let session_cache = options.session.then(new_session_cache);
        let fingerprint = Arc::new(options.fingerprint.clone());
        let transports = TransportCache::new(options.transport_cache_max);

        Ok(Client {
            inner: Arc::new(Inner {
                options,
                fingerprint,
                resolver,
                dialer,
                transports,
                singleton: Mutex::new(None),
                jar,
                session_cache,
                pool: Arc::new(BufferPool::default()),
                stats: ClientStats::default(),
            }),
        })
    }

    /// An independent child: same options, fresh caches and session state.
    pub fn child(&self) -> Result<Client> {
        Client::from_options(self.inner.options.clone())
    }

    /// The resolved default header set (profile merged with user headers).
    pub fn default_headers(&self) -> &OrderedHeaders {
        &self.inner.options.headers
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.inner.stats.total_requests.load(Ordering::Relaxed),
            retries: self.inner.stats.retries.load(Ordering::Relaxed),
            redirects_followed: self.inner.stats.redirects_followed.load(Ordering::Relaxed),
        }
    }

    /// The session cookie jar, when `session()` was set.
    pub fn cookie_jar(&self) -> Option<&Arc<Jar>> {
        self.inner.jar.as_ref()
    }

    /// Store cookies for `url` in the session jar.
    pub fn set_cookies(&self, url: &Url, cookies: &[(String, String)]) -> Result<()> {
        let jar = self
            .inner
            .jar
            .as_ref()
            .ok_or_else(|| error::builder_msg("set_cookies requires session()"))?;
        jar.add_cookies(cookies, url);
        Ok(())
    }

    /// The `Cookie` value the jar would send to `url`.
    pub fn get_cookies(&self, url: &Url) -> Option<String> {
        self.inner.jar.as_ref()?.cookies(url)
    }

    /// Drop every cached transport.
    pub fn clear_cached_transports(&self) {
        self.inner.transports.clear();
        self.inner.singleton.lock().expect("singleton slot").take();
    }

    /// Drain idle HTTP/1 and HTTP/2 pools; close HTTP/3 sessions.
    pub fn close_idle_connections(&self) {
        if let Some(transport) = self.inner.singleton.lock().expect("singleton slot").as_ref() {
            transport.close_idle();
        }
        self.inner.transports.clear();
    }

    /// The multipart boundary generator configured on this client.
    pub fn new_form(&self) -> Form {
        match &self.inner.options.boundary {
            Some(generator) => Form::with_boundary(generator),
            None => Form::new(),
        }
    }

    // ===== request constructors =====

    pub fn request(&self, method: Method, url: impl IntoUrl) -> Result<Request> {
        Ok(Request::new(method, url.into_url()?))
    }

    pub fn get(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::GET, url)
    }

    pub fn head(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::HEAD, url)
    }

    pub fn post(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::DELETE, url)
    }

    pub fn options(&self, url: impl IntoUrl) -> Result<Request> {
        self.request(Method::OPTIONS, url)
    }

    /// A multipart upload of one in-memory file under field `name`.
    pub fn file_upload(
        &self,
        url: impl IntoUrl,
        name: &str,
        file_name: &str,
        contents: impl Into<Bytes>,
    ) -> Result<Request> {
        let mut request = self.request(Method::POST, url)?;
        let form = self.new_form().part(
            name.to_string(),
            crate::multipart::Part::bytes(contents.into()).file_name(file_name.to_string()),
        );
        request.body = crate::http::RequestBody::Multipart(form);
        Ok(request)
    }

    /// A multipart request from a prepared form.
    pub fn multipart(&self, url: impl IntoUrl, form: Form) -> Result<Request> {
        let mut request = self.request(Method::POST, url)?;
        request.body = crate::http::RequestBody::Multipart(form);
        Ok(request)
    }

    /// A verbatim request text; scheme and authority from `base`.
    pub fn raw(&self, text: &str, base: impl IntoUrl) -> Result<Request> {
        Request::raw(text, &base.into_url()?)
    }

    // ===== execution =====

    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        let inner = &self.inner;
        inner.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        inner.options.middleware.run_request_hooks(&mut request)?;

        let mut ctx = inner.options.context.clone().unwrap_or_default();
        if let Some(timeout) = inner.options.timeout {
            ctx = ctx.with_timeout(timeout);
        }
        if let Some(timeout) = request.timeout {
            ctx = ctx.with_timeout(timeout);
        }

        request.headers.merge_defaults(&inner.options.headers);
        let (body, implied_content_type) = request.encode_body().await?;
        if let Some(content_type) = implied_content_type {
            if !request.headers.contains("content-type") {
                request.headers.append("Content-Type", content_type);
            }
        }

        let retry = &inner.options.retry;
        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            ctx.check()?;
            match self.run_redirects(&ctx, &request, body.clone()).await {
                Ok(mut response) => {
                    let transient =
                        retry.enabled() && retry.retries_status(response.status());
                    if transient && attempt <= retry.attempts {
                        inner.stats.retries.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(status = %response.status(), attempt, "retrying");
                        response.release();
                        ctx.run(async {
                            tokio::time::sleep(retry.delay(attempt)).await;
                            Ok(())
                        })
                        .await?;
                        continue;
                    }
                    response.attempts = attempt;
                    response.elapsed = start.elapsed();
                    inner.options.middleware.run_response_hooks(&mut response)?;
                    return Ok(response);
                }
                Err(e) => {
                    if retry.enabled() && attempt <= retry.attempts && retry.retries_error(&e) {
                        inner.stats.retries.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(error = %e, attempt, "retrying after network error");
                        ctx.run(async {
                            tokio::time::sleep(retry.delay(attempt)).await;
                            Ok(())
                        })
                        .await?;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn run_redirects(
        &self,
        ctx: &Context,
        request: &Request,
        body: Option<Bytes>,
    ) -> Result<Response> {
        let inner = &self.inner;
        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut headers = request.headers.clone();
        let mut current_body = body;
        let mut visited: Vec<Url> = Vec::new();
        let mut history: Vec<HistoryEntry> = Vec::new();
        let mut referer: Option<String> = None;

        loop {
            ctx.check()?;

            let mut hop_headers = headers.clone();
            self.attach_cookies(&mut hop_headers, &url, &request.cookies);
            if let Some(referer_value) = &referer {
                if !hop_headers.contains("referer") {
                    hop_headers.set("Referer", referer_value.clone());
                }
            }
            let user_agent = hop_headers.get("user-agent").map(str::to_string);

            let transport = self.transport_for(&url)?;
            let outcome = transport
                .execute(
                    ctx,
                    TransportRequest {
                        method: method.clone(),
                        url: url.clone(),
                        headers: hop_headers,
                        body: current_body.clone(),
                    },
                )
                .await?;

            if let Some(jar) = &inner.jar {
                let mut set_cookies = outcome.headers.get_all("set-cookie");
                jar.set_cookies(&mut set_cookies, &url);
            }

            let status = outcome.status;
            let location = status
                .is_redirection()
                .then(|| outcome.headers.get("location").map(str::to_string))
                .flatten();

            if let Some(location) = location {
                let next = url.join(&location).map_err(|e| {
                    error::redirect(format!("invalid Location: {e}"), url.clone())
                })?;
                visited.push(url.clone());
                match inner.options.redirect.check(status, &next, &visited) {
                    Action::Follow => {
                        inner.stats.redirects_followed.fetch_add(1, Ordering::Relaxed);
                        if inner.options.history {
                            history.push(HistoryEntry {
                                method: method.clone(),
                                url: url.clone(),
                                status,
                                headers: outcome.headers.clone(),
                                cookies: outcome
                                    .headers
                                    .get_all("set-cookie")
                                    .map(str::to_string)
                                    .collect(),
                            });
                        }
                        redirect::sanitize_headers(
                            &mut headers,
                            &url,
                            &next,
                            inner.options.forward_headers_on_redirect,
                        );
                        let next_method = redirect::redirect_method(status, &method);
                        if next_method != method {
                            // the rewrite to GET drops the body
                            current_body = None;
                            headers.remove("content-type");
                            headers.remove("content-length");
                        }
                        method = next_method;
                        referer = redirect::make_referer(&url, &next);
                        tracing::debug!(from = %url, to = %next, "following redirect");
                        url = next;
                        continue;
                    }
                    Action::Stop => {
                        return self.finish(ctx, outcome, url, referer, user_agent, history);
                    }
                    Action::Error(message) => {
                        return Err(error::redirect_with_history(
                            format!("{message}, after {} hops", visited.len() - 1),
                            next,
                            history,
                        ));
                    }
                }
            }

            return self.finish(ctx, outcome, url, referer, user_agent, history);
        }
    }

    fn finish(
        &self,
        ctx: &Context,
        outcome: crate::protocols::TransportResponse,
        url: Url,
        referer: Option<String>,
        user_agent: Option<String>,
        history: Vec<HistoryEntry>,
    ) -> Result<Response> {
        let inner = &self.inner;
        let encoding = Encoding::from_header(outcome.headers.get("content-encoding"));
        let body = Body::new(
            outcome.body,
            encoding,
            ctx.clone(),
            inner.options.cache_body,
            Arc::clone(&inner.pool),
        )?;
        Ok(Response {
            status: outcome.status,
            protocol: outcome.protocol,
            headers: outcome.headers,
            url,
            referer,
            user_agent,
            remote_addr: inner
                .options
                .remote_address
                .then_some(outcome.remote_addr)
                .flatten(),
            elapsed: std::time::Duration::ZERO,
            attempts: 1,
            history,
            body,
        })
    }

    fn attach_cookies(
        &self,
        headers: &mut OrderedHeaders,
        url: &Url,
        explicit: &[(String, String)],
    ) {
        let mut parts: Vec<String> = Vec::new();
        if let Some(jar) = &self.inner.jar {
            if let Some(value) = jar.cookies(url) {
                parts.push(value);
            }
        }
        for (name, value) in explicit {
            parts.push(format!("{name}={value}"));
        }
        if !parts.is_empty() {
            let merged = parts.join("; ");
            match headers.get("cookie") {
                Some(existing) => {
                    let combined = format!("{existing}; {merged}");
                    headers.set("Cookie", combined);
                }
                None => headers.set("Cookie", merged),
            }
        }
    }

    fn transport_for(&self, url: &Url) -> Result<Arc<Transport>> {
        let inner = &self.inner;
        if inner.options.singleton {
            let mut pinned = inner.singleton.lock().expect("singleton slot");
            if let Some(transport) = pinned.as_ref() {
                return Ok(Arc::clone(transport));
            }
            let transport = Arc::new(self.build_transport(url));
            *pinned = Some(Arc::clone(&transport));
            return Ok(transport);
        }

        let proxy_id = inner
            .options
            .proxy
            .as_ref()
            .map(|p| p.identity(url))
            .unwrap_or_else(|| "direct".to_string());
        let key = transport_key(
            &inner.fingerprint,
            &proxy_id,
            &inner.resolver.identity(),
            self.force_for(url),
            inner.options.unix_socket.as_ref(),
        );
        Ok(inner
            .transports
            .get_or_insert_with(key, || self.build_transport(url)))
    }

    fn force_for(&self, url: &Url) -> ForceProtocol {
        let force = self.inner.options.force_protocol;
        if force == ForceProtocol::Http3 && url.scheme() != "https" {
            // plaintext QUIC does not exist; fall back to the TCP path
            return ForceProtocol::Auto;
        }
        force
    }

    fn build_transport(&self, url: &Url) -> Transport {
        let inner = &self.inner;
        let proxy = inner
            .options
            .proxy
            .as_ref()
            .and_then(|p| p.for_url(url));
        Transport::new(
            Arc::clone(&inner.fingerprint),
            inner.dialer.clone(),
            proxy,
            self.force_for(url),
            inner.options.verify,
            inner.session_cache.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ClientBuilder;

    #[test]
    fn client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Client>();
    }

    #[test]
    fn child_gets_fresh_session_state() {
        let client = ClientBuilder::new().session().build().unwrap();
        let url = Url::parse("https://example.com/").unwrap();
        client
            .set_cookies(&url, &[("a".to_string(), "1".to_string())])
            .unwrap();
        assert!(client.get_cookies(&url).is_some());

        let child = client.child().unwrap();
        assert!(child.get_cookies(&url).is_none());
    }

    #[test]
    fn transport_cache_returns_same_instance_for_equal_keys() {
        let client = ClientBuilder::new().build().unwrap();
        let url = Url::parse("https://example.com/").unwrap();
        let a = client.transport_for(&url).unwrap();
        let b = client.transport_for(&url).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn singleton_pins_one_transport_across_hosts() {
        let client = ClientBuilder::new().singleton().build().unwrap();
        let a = client
            .transport_for(&Url::parse("https://a.test/").unwrap())
            .unwrap();
        let b = client
            .transport_for(&Url::parse("https://b.test/").unwrap())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn cookies_attach_from_jar_and_request() {
        let client = ClientBuilder::new().session().build().unwrap();
        let url = Url::parse("https://example.com/").unwrap();
        client
            .set_cookies(&url, &[("jar".to_string(), "1".to_string())])
            .unwrap();

        let mut headers = OrderedHeaders::new();
        client.attach_cookies(&mut headers, &url, &[("req".to_string(), "2".to_string())]);
        let cookie = headers.get("cookie").unwrap();
        assert!(cookie.contains("jar=1"));
        assert!(cookie.contains("req=2"));
    }
}
