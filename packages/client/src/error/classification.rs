//! Classification predicates on [`Error`], used by the retry engine and by
//! callers that branch on failure categories.

use super::types::{Error, Kind};

impl Error {
    /// True when the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::Timeout)
    }

    /// True when the request context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.kind, Kind::Cancelled)
    }

    /// True for builder/configuration failures.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// True when the redirect engine gave up.
    pub fn is_redirect(&self) -> bool {
        matches!(self.inner.kind, Kind::Redirect)
    }

    /// True for failures the retry engine may consume: transient network
    /// errors and stream-level resets. Status-code retries are decided by
    /// the policy, not here.
    pub fn is_retryable(&self) -> bool {
        match self.inner.kind {
            Kind::Dns | Kind::Dial => true,
            Kind::Protocol => self
                .inner
                .source
                .as_ref()
                .map(|s| {
                    let text = s.to_string();
                    text.contains("RST_STREAM") || text.contains("REFUSED_STREAM")
                })
                .unwrap_or(false),
            Kind::Body => self
                .inner
                .source
                .as_ref()
                .and_then(|s| s.downcast_ref::<std::io::Error>())
                .map(|io| {
                    matches!(
                        io.kind(),
                        std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::ConnectionAborted
                            | std::io::ErrorKind::BrokenPipe
                    )
                })
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error;

    #[test]
    fn dns_errors_are_retryable() {
        assert!(error::dns("resolution failed").is_retryable());
    }

    #[test]
    fn refused_stream_is_retryable() {
        assert!(error::protocol("REFUSED_STREAM on stream 1").is_retryable());
        assert!(!error::protocol("compression error").is_retryable());
    }

    #[test]
    fn timeouts_are_not_retryable() {
        let err = error::timeout();
        assert!(err.is_timeout());
        assert!(!err.is_retryable());
    }
}
