//! Response model: status, ordered headers, cookies, timing, redirect
//! history and the lazy body handle.

pub mod body;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use url::Url;

use super::headers::OrderedHeaders;
use crate::error::Result;

pub use body::{Body, BodyReader, BufferPool, Encoding};

/// One hop recorded when `history()` is enabled.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub method: Method,
    pub url: Url,
    pub status: StatusCode,
    pub headers: OrderedHeaders,
    pub cookies: Vec<String>,
}

/// A received response.
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) protocol: &'static str,
    pub(crate) headers: OrderedHeaders,
    pub(crate) url: Url,
    pub(crate) referer: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) elapsed: Duration,
    pub(crate) attempts: u32,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) body: Body,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase, e.g. `OK`.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// `HTTP/1.1`, `HTTP/2.0` or `HTTP/3.0`.
    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn headers(&self) -> &OrderedHeaders {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Referer of the final hop, when the response came through redirects.
    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    /// The User-Agent the server saw.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Remote socket address, when `remote_address()` was enabled.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of attempts the retry engine spent, including the final one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Redirect chain, oldest first; empty unless `history()` was enabled.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length")?.parse().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// `Set-Cookie` values of the final hop.
    pub fn set_cookies(&self) -> Vec<cookie::Cookie<'static>> {
        self.headers
            .get_all("set-cookie")
            .filter_map(|value| cookie::Cookie::parse(value.to_string()).ok())
            .collect()
    }

    /// A cookie set by the final hop, by name.
    pub fn cookie(&self, name: &str) -> Option<cookie::Cookie<'static>> {
        self.set_cookies().into_iter().find(|c| c.name() == name)
    }

    fn charset(&self) -> Option<String> {
        let content_type = self.content_type()?;
        let mime: mime::Mime = content_type.parse().ok()?;
        mime.get_param(mime::CHARSET)
            .map(|charset| charset.as_str().to_string())
    }

    /// Turn 4xx/5xx statuses into a typed error, consuming the response.
    pub fn error_for_status(self) -> Result<Response> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(crate::error::status_code(self.url.clone(), self.status))
        } else {
            Ok(self)
        }
    }

    // ===== body operations =====

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Cap the number of decoded body bytes subsequent reads observe.
    pub fn limit(&mut self, max: u64) -> &mut Self {
        self.body.limit(max);
        self
    }

    pub async fn bytes(&mut self) -> Result<Bytes> {
        self.body.bytes().await
    }

    /// Drain as text, decoding lossily as UTF-8.
    pub async fn string(&mut self) -> Result<String> {
        self.body.string().await
    }

    /// Drain as text, honoring the charset of the Content-Type header (or a
    /// meta-tag sniff).
    pub async fn utf8(&mut self) -> Result<String> {
        let charset = self.charset();
        self.body.text_with_charset(charset.as_deref()).await
    }

    pub async fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        self.body.json().await
    }

    pub async fn md5(&mut self) -> Result<String> {
        self.body.md5().await
    }

    /// Stream the decoded body into `path`; atomic rename on success.
    pub async fn dump(&mut self, path: impl AsRef<std::path::Path>) -> Result<u64> {
        self.body.dump(path).await
    }

    /// Hand out the decoded stream; valid once, on an unread body.
    pub fn stream(&mut self) -> Result<BodyReader> {
        self.body.stream()
    }

    /// Return body buffers to the client's pool. Idempotent.
    pub fn release(&mut self) {
        self.body.release();
    }
}
