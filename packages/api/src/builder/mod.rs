//! Fluent request construction over a built client.

use bytes::Bytes;
use http::Method;
use serde::Serialize;

use guise_client::http::RequestBody;
use guise_client::multipart::Form;
use guise_client::{Client, IntoUrl, Request, Response, Result};

/// Extends [`Client`] with fluent request constructors.
pub trait ClientExt {
    /// Begin a GET request to `url`.
    fn fetch(&self, url: impl IntoUrl) -> RequestBuilder;
    /// Begin a request with an explicit method.
    fn method(&self, method: Method, url: impl IntoUrl) -> RequestBuilder;
}

impl ClientExt for Client {
    fn fetch(&self, url: impl IntoUrl) -> RequestBuilder {
        self.method(Method::GET, url)
    }

    fn method(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            request: self.request(method, url),
        }
    }
}

/// A request under fluent construction; terminal call is [`send`].
///
/// [`send`]: RequestBuilder::send
#[must_use = "a RequestBuilder does nothing until send() is awaited"]
pub struct RequestBuilder {
    client: Client,
    request: Result<Request>,
}

impl RequestBuilder {
    pub(crate) fn from_shared(method: Method, url: impl IntoUrl) -> RequestBuilder {
        let client = crate::Guise::client();
        RequestBuilder {
            client: (*client).clone(),
            request: client.request(method, url),
        }
    }

    fn map(mut self, f: impl FnOnce(&mut Request)) -> Self {
        if let Ok(request) = &mut self.request {
            f(request);
        }
        self
    }

    /// Append a header, keeping insertion order on the wire.
    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map(|r| {
            r.header(name.into(), value.into());
        })
    }

    /// Append several headers in iteration order.
    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map(|r| {
            for (name, value) in headers {
                r.header(name.into(), value.into());
            }
        })
    }

    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        self.map(|r| {
            r.basic_auth(user, password);
        })
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.map(|r| {
            r.bearer_auth(token);
        })
    }

    /// Send a cookie pair with this request only.
    pub fn cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.map(|r| r.cookies.push((name.into(), value.into())))
    }

    /// Per-request deadline; composes with the client timeout.
    pub fn timeout(self, timeout: std::time::Duration) -> Self {
        self.map(|r| r.timeout = Some(timeout))
    }

    // ===== bodies =====

    pub fn body(self, bytes: impl Into<Bytes>) -> Self {
        self.map(|r| r.body = RequestBody::Bytes(bytes.into()))
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.map(|r| r.body = RequestBody::Text(text.into()))
    }

    /// JSON-encode `value`; sets `Content-Type: application/json` unless
    /// overridden.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        if let Ok(request) = &mut self.request {
            if let Err(e) = request.json(value) {
                self.request = Err(e);
            }
        }
        self
    }

    /// URL-encoded form body.
    pub fn form<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map(|r| {
            r.body = RequestBody::Form(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            );
        })
    }

    /// Multipart body from a prepared form.
    pub fn multipart(self, form: Form) -> Self {
        self.map(|r| r.body = RequestBody::Multipart(form))
    }

    /// Execute the request through the client's pipeline.
    pub async fn send(self) -> Result<Response> {
        let request = self.request?;
        self.client.execute(request).await
    }
}
