//! Constructor helpers used throughout the crate to build typed errors.

use http::StatusCode;

use super::types::{BoxError, Error, Kind};

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder).with(e)
}

pub(crate) fn builder_msg(msg: impl Into<String>) -> Error {
    Error::new(Kind::Builder).with(msg.into())
}

pub(crate) fn dns<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Dns).with(e)
}

pub(crate) fn dial<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Dial).with(e)
}

pub(crate) fn proxy_auth(msg: impl Into<String>) -> Error {
    Error::new(Kind::ProxyAuth).with(msg.into())
}

pub(crate) fn tls<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::TlsHandshake).with(e)
}

pub(crate) fn quic<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::QuicHandshake).with(e)
}

pub(crate) fn protocol(msg: impl Into<String>) -> Error {
    Error::new(Kind::Protocol).with(msg.into())
}

pub(crate) fn timeout() -> Error {
    Error::new(Kind::Timeout)
}

pub(crate) fn cancelled() -> Error {
    Error::new(Kind::Cancelled)
}

pub(crate) fn redirect(msg: impl Into<String>, url: url::Url) -> Error {
    Error::new(Kind::Redirect).with(msg.into()).with_url(url)
}

/// Redirect failure carrying the hops followed so far, so callers with
/// history enabled can inspect the chain after `TooManyRedirects`.
pub(crate) fn redirect_with_history(
    msg: impl Into<String>,
    url: url::Url,
    history: Vec<crate::http::response::HistoryEntry>,
) -> Error {
    redirect(msg, url).with_history(history)
}

pub(crate) fn status_code(url: url::Url, status: StatusCode) -> Error {
    Error::new(Kind::Status(status)).with_url(url)
}

pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Decode).with(e)
}

pub(crate) fn body<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Body).with(e)
}

pub(crate) fn short_write(written: usize, expected: usize) -> Error {
    Error::new(Kind::ShortWrite).with(format!("wrote {written} of {expected} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_url_and_source() {
        let url = url::Url::parse("https://example.com/a").unwrap();
        let err = dns(std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"))
            .with_url(url);
        let text = err.to_string();
        assert!(text.contains("dns error"));
        assert!(text.contains("example.com"));
        assert!(text.contains("no such host"));
    }

    #[test]
    fn status_accessor() {
        let url = url::Url::parse("https://example.com").unwrap();
        let err = status_code(url, StatusCode::BAD_GATEWAY);
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }
}
