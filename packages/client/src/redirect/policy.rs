use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use url::Url;

/// A redirect decision point handed to custom policies.
#[derive(Debug)]
pub struct Attempt<'a> {
    pub(crate) status: StatusCode,
    pub(crate) next: &'a Url,
    pub(crate) previous: &'a [Url],
}

impl<'a> Attempt<'a> {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The URL the server is redirecting to.
    pub fn url(&self) -> &Url {
        self.next
    }

    /// Prior hops, oldest first; the last entry is the redirecting URL.
    pub fn previous(&self) -> &[Url] {
        self.previous
    }

    pub fn follow(self) -> Action {
        Action::Follow
    }

    pub fn stop(self) -> Action {
        Action::Stop
    }

    pub fn error(self, message: impl Into<String>) -> Action {
        Action::Error(message.into())
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Follow,
    /// Stop following; the redirect response itself is returned.
    Stop,
    Error(String),
}

type CustomPolicy = dyn Fn(Attempt<'_>) -> Action + Send + Sync;

/// Redirect policy of a client.
#[derive(Clone)]
pub enum Policy {
    /// Follow up to a maximum number of hops.
    Limited(usize),
    /// Never follow; redirect responses are returned as-is.
    None,
    /// Follow only when the next hop stays on the same host and port.
    HostOnly(usize),
    Custom(Arc<CustomPolicy>),
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Limited(10)
    }
}

impl Policy {
    pub fn limited(max: usize) -> Self {
        Policy::Limited(max)
    }

    pub fn none() -> Self {
        Policy::None
    }

    pub fn host_only() -> Self {
        Policy::HostOnly(10)
    }

    pub fn custom<F>(policy: F) -> Self
    where
        F: Fn(Attempt<'_>) -> Action + Send + Sync + 'static,
    {
        Policy::Custom(Arc::new(policy))
    }

    pub(crate) fn check(&self, status: StatusCode, next: &Url, previous: &[Url]) -> Action {
        match self {
            Policy::Limited(max) => {
                if previous.len() > *max {
                    Action::Error(format!("too many redirects ({max} allowed)"))
                } else {
                    Action::Follow
                }
            }
            Policy::None => Action::Stop,
            Policy::HostOnly(max) => {
                if previous.len() > *max {
                    return Action::Error(format!("too many redirects ({max} allowed)"));
                }
                match previous.last() {
                    Some(current) if super::same_host(current, next) => Action::Follow,
                    Some(_) => Action::Stop,
                    None => Action::Follow,
                }
            }
            Policy::Custom(policy) => policy(Attempt {
                status,
                next,
                previous,
            }),
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Limited(max) => f.debug_tuple("Limited").field(max).finish(),
            Policy::None => f.write_str("None"),
            Policy::HostOnly(max) => f.debug_tuple("HostOnly").field(max).finish(),
            Policy::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    #[test]
    fn limited_policy_errors_past_the_cap() {
        let policy = Policy::default();
        let next = url("http://x.test/z");
        let mut previous: Vec<Url> = (0..10).map(|i| url(&format!("http://a.test/{i}"))).collect();

        assert_eq!(
            policy.check(StatusCode::FOUND, &next, &previous),
            Action::Follow
        );
        previous.push(url("http://a.test/10"));
        assert!(matches!(
            policy.check(StatusCode::FOUND, &next, &previous),
            Action::Error(_)
        ));
    }

    #[test]
    fn limited_zero_never_follows() {
        let policy = Policy::limited(0);
        let previous = vec![url("http://a.test/")];
        assert!(matches!(
            policy.check(StatusCode::FOUND, &url("http://b.test/"), &previous),
            Action::Error(_)
        ));
    }

    #[test]
    fn host_only_stops_cross_host() {
        let policy = Policy::host_only();
        let previous = vec![url("https://a.test/")];
        assert_eq!(
            policy.check(StatusCode::FOUND, &url("https://a.test/next"), &previous),
            Action::Follow
        );
        assert_eq!(
            policy.check(StatusCode::FOUND, &url("https://b.test/"), &previous),
            Action::Stop
        );
    }

    #[test]
    fn custom_policy_decides_per_url() {
        let policy = Policy::custom(|attempt| {
            if attempt.url().host_str() == Some("blocked.test") {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });
        assert_eq!(
            policy.check(StatusCode::FOUND, &url("https://ok.test/"), &[]),
            Action::Follow
        );
        assert_eq!(
            policy.check(StatusCode::FOUND, &url("https://blocked.test/"), &[]),
            Action::Stop
        );
    }
}
