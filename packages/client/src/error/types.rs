use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

use crate::http::response::HistoryEntry;

/// A Result alias where the Err case is `guise_client::Error`.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// The error type produced by every fallible operation of the client.
///
/// Internally this is a boxed record carrying the error kind, an optional
/// source and the URL the request was targeting when the failure occurred.
pub struct Error {
    pub(crate) inner: Box<Inner>,
}

pub(crate) struct Inner {
    pub(crate) kind: Kind,
    pub(crate) source: Option<BoxError>,
    pub(crate) url: Option<url::Url>,
    pub(crate) history: Vec<HistoryEntry>,
}

/// Classification of client failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Invalid option combination or malformed builder input.
    Builder,
    /// Name resolution failed.
    Dns,
    /// TCP/UDP/Unix dial failure.
    Dial,
    /// The proxy rejected our credentials.
    ProxyAuth,
    /// TLS handshake failure.
    TlsHandshake,
    /// QUIC handshake failure.
    QuicHandshake,
    /// Peer violated the wire protocol (malformed frame, bad SOCKS header, ...).
    Protocol,
    /// Deadline elapsed.
    Timeout,
    /// The request context was cancelled.
    Cancelled,
    /// Redirect loop or too many hops.
    Redirect,
    /// A status the retry policy refused to consume.
    Status(StatusCode),
    /// Body decoding failure (JSON, charset).
    Decode,
    /// Body I/O failure.
    Body,
    /// A write completed short of the full payload.
    ShortWrite,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: None,
                url: None,
                history: Vec::new(),
            }),
        }
    }

    pub(crate) fn with<E: Into<BoxError>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    pub(crate) fn with_history(mut self, history: Vec<HistoryEntry>) -> Error {
        self.inner.history = history;
        self
    }

    /// Attach the URL that was being processed when the error occurred.
    #[must_use]
    pub fn with_url(mut self, url: url::Url) -> Error {
        self.inner.url = Some(url);
        self
    }

    /// The URL associated with this error, if any.
    pub fn url(&self) -> Option<&url::Url> {
        self.inner.url.as_ref()
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// The status code carried by a `Kind::Status` error.
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Kind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// Redirect hops followed before a `Kind::Redirect` failure, oldest
    /// first. Populated when the client had history enabled.
    pub fn redirect_history(&self) -> &[HistoryEntry] {
        &self.inner.history
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("guise::Error");

        f.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }

        if let Some(ref url) = self.inner.url {
            f.field("url", &url.as_str());
        }

        if !self.inner.history.is_empty() {
            f.field("redirect_hops", &self.inner.history.len());
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Dns => f.write_str("dns error")?,
            Kind::Dial => f.write_str("error dialing remote")?,
            Kind::ProxyAuth => f.write_str("proxy authentication rejected")?,
            Kind::TlsHandshake => f.write_str("TLS handshake failed")?,
            Kind::QuicHandshake => f.write_str("QUIC handshake failed")?,
            Kind::Protocol => f.write_str("protocol violation")?,
            Kind::Timeout => f.write_str("request timed out")?,
            Kind::Cancelled => f.write_str("request cancelled")?,
            Kind::Redirect => f.write_str("error following redirect")?,
            Kind::Status(code) => {
                let prefix = if code.is_client_error() {
                    "HTTP status client error"
                } else {
                    "HTTP status server error"
                };
                write!(f, "{prefix} ({code})")?;
            }
            Kind::Decode => f.write_str("error decoding response body")?,
            Kind::Body => f.write_str("request or response body error")?,
            Kind::ShortWrite => f.write_str("short write")?,
        }

        if let Some(url) = &self.inner.url {
            write!(f, " for url ({url})")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}
