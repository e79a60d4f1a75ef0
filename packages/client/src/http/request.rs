//! Request model: method, URL, ordered headers, cookies and body variants.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use super::headers::OrderedHeaders;
use crate::error::{self, Result};
use crate::multipart::Form;

/// Request body variants; encoded to bytes once, before the redirect loop.
pub enum Body {
    None,
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart(Form),
    Reader(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::None => f.write_str("Body::None"),
            Body::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Body::Text(text) => write!(f, "Body::Text({} chars)", text.len()),
            Body::Json(_) => f.write_str("Body::Json"),
            Body::Form(fields) => write!(f, "Body::Form({} fields)", fields.len()),
            Body::Multipart(form) => write!(f, "Body::Multipart({form:?})"),
            Body::Reader(_) => f.write_str("Body::Reader"),
        }
    }
}

/// A request under construction; consumed once by the pipeline.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: OrderedHeaders,
    pub cookies: Vec<(String, String)>,
    pub body: Body,
    /// Per-request deadline; composes with the client timeout, earliest wins.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: OrderedHeaders::new(),
            cookies: Vec::new(),
            body: Body::None,
            timeout: None,
        }
    }

    /// Parse a verbatim request text (request line, headers, optional body).
    /// The scheme and authority come from the caller since the text carries
    /// only the origin-form target.
    pub fn raw(text: &str, base: &Url) -> Result<Self> {
        let bytes = text.as_bytes();
        let mut header_storage = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Request::new(&mut header_storage);
        let body_offset = match parsed.parse(bytes).map_err(error::builder)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => {
                return Err(error::builder_msg("incomplete raw request text"))
            }
        };

        let method = parsed
            .method
            .ok_or_else(|| error::builder_msg("raw request without method"))?
            .parse::<Method>()
            .map_err(error::builder)?;
        let target = parsed
            .path
            .ok_or_else(|| error::builder_msg("raw request without target"))?;
        let url = base.join(target).map_err(error::builder)?;

        let mut request = Request::new(method, url);
        for header in parsed.headers.iter() {
            request.headers.append(
                header.name,
                String::from_utf8_lossy(header.value).into_owned(),
            );
        }
        let body = &bytes[body_offset..];
        if !body.is_empty() {
            request.body = Body::Bytes(Bytes::copy_from_slice(body));
        }
        Ok(request)
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    pub fn basic_auth(&mut self, user: &str, password: &str) -> &mut Self {
        let credentials = BASE64.encode(format!("{user}:{password}"));
        self.headers.set("Authorization", format!("Basic {credentials}"));
        self
    }

    pub fn bearer_auth(&mut self, token: &str) -> &mut Self {
        self.headers.set("Authorization", format!("Bearer {token}"));
        self
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self> {
        self.body = Body::Json(serde_json::to_value(value).map_err(error::builder)?);
        Ok(self)
    }

    /// Encode the body variant into bytes plus the content type it implies.
    /// Reader bodies are drained here, so the redirect engine can re-send.
    pub async fn encode_body(&mut self) -> Result<(Option<Bytes>, Option<String>)> {
        let body = std::mem::replace(&mut self.body, Body::None);
        let encoded = match body {
            Body::None => (None, None),
            Body::Bytes(bytes) => (Some(bytes), None),
            Body::Text(text) => (
                Some(Bytes::from(text)),
                Some("text/plain; charset=utf-8".to_string()),
            ),
            Body::Json(value) => (
                Some(Bytes::from(
                    serde_json::to_vec(&value).map_err(error::builder)?,
                )),
                Some("application/json".to_string()),
            ),
            Body::Form(fields) => (
                Some(Bytes::from(
                    serde_urlencoded::to_string(&fields)
                        .map_err(error::builder)?
                        .into_bytes(),
                )),
                Some("application/x-www-form-urlencoded".to_string()),
            ),
            Body::Multipart(form) => {
                let content_type = form.content_type();
                (Some(form.encode()), Some(content_type))
            }
            Body::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await.map_err(error::body)?;
                (Some(Bytes::from(buf)), None)
            }
        };
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_request_parses_line_headers_and_body() {
        let base = Url::parse("https://api.example.com").unwrap();
        let request = Request::raw(
            "POST /v1/items?x=1 HTTP/1.1\r\nX-Token: abc\r\nContent-Type: text/plain\r\n\r\npayload",
            &base,
        )
        .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://api.example.com/v1/items?x=1");
        assert_eq!(request.headers.get("x-token"), Some("abc"));
        assert!(matches!(&request.body, Body::Bytes(b) if &b[..] == b"payload"));
    }

    #[tokio::test]
    async fn json_body_implies_content_type() {
        let url = Url::parse("https://example.com").unwrap();
        let mut request = Request::new(Method::POST, url);
        request.json(&serde_json::json!({"k": "v"})).unwrap();
        let (body, content_type) = request.encode_body().await.unwrap();
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(&body.unwrap()[..], br#"{"k":"v"}"#);
    }

    #[tokio::test]
    async fn form_body_is_urlencoded() {
        let url = Url::parse("https://example.com").unwrap();
        let mut request = Request::new(Method::POST, url);
        request.body = Body::Form(vec![
            ("a".to_string(), "1 2".to_string()),
            ("b".to_string(), "x&y".to_string()),
        ]);
        let (body, content_type) = request.encode_body().await.unwrap();
        assert_eq!(
            content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(&body.unwrap()[..], b"a=1+2&b=x%26y");
    }

    #[test]
    fn auth_helpers_replace_existing_values() {
        let url = Url::parse("https://example.com").unwrap();
        let mut request = Request::new(Method::GET, url);
        request.basic_auth("user", "pass");
        request.bearer_auth("token");
        assert_eq!(request.headers.get_all("authorization").count(), 1);
        assert_eq!(request.headers.get("authorization"), Some("Bearer token"));
    }
}
