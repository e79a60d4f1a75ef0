//! Retry policy: transient status codes and network errors, linear or
//! caller-supplied backoff.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::error::Error;

/// Default transient statuses retried when none are configured.
const DEFAULT_STATUSES: &[u16] = &[500, 502, 503, 504];

type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Delay between attempts.
#[derive(Clone)]
pub enum Backoff {
    /// `attempt * base`, a linear ramp.
    Linear(Duration),
    Custom(Arc<BackoffFn>),
}

impl Backoff {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Backoff::Custom(Arc::new(f))
    }

    pub(crate) fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Linear(base) => base.saturating_mul(attempt),
            Backoff::Custom(f) => f(attempt),
        }
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backoff::Linear(base) => f.debug_tuple("Linear").field(base).finish(),
            Backoff::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Retry configuration of a client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first; 0 disables retries.
    pub attempts: u32,
    pub backoff: Backoff,
    /// Statuses that trigger a retry; empty means the default set.
    pub statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            backoff: Backoff::Linear(Duration::from_millis(250)),
            statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration, statuses: Vec<u16>) -> Self {
        Self {
            attempts,
            backoff: Backoff::Linear(backoff),
            statuses,
        }
    }

    pub fn enabled(&self) -> bool {
        self.attempts > 0
    }

    /// Whether `status` should be retried.
    pub fn retries_status(&self, status: StatusCode) -> bool {
        if self.statuses.is_empty() {
            DEFAULT_STATUSES.contains(&status.as_u16())
        } else {
            self.statuses.contains(&status.as_u16())
        }
    }

    /// Whether `error` is a transient network failure worth retrying.
    pub fn retries_error(&self, error: &Error) -> bool {
        error.is_retryable()
    }

    pub(crate) fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_statuses_cover_transient_5xx() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), Vec::new());
        assert!(policy.retries_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.retries_status(StatusCode::BAD_GATEWAY));
        assert!(!policy.retries_status(StatusCode::NOT_FOUND));
        assert!(!policy.retries_status(StatusCode::OK));
    }

    #[test]
    fn explicit_statuses_replace_defaults() {
        let policy = RetryPolicy::new(1, Duration::from_millis(10), vec![429]);
        assert!(policy.retries_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.retries_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn linear_backoff_ramps() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50), Vec::new());
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(3), Duration::from_millis(150));
    }

    #[test]
    fn custom_backoff_is_used() {
        let policy = RetryPolicy {
            attempts: 2,
            backoff: Backoff::custom(|attempt| Duration::from_millis(u64::from(attempt) * 7)),
            statuses: Vec::new(),
        };
        assert_eq!(policy.delay(2), Duration::from_millis(14));
    }
}
