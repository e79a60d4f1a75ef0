//! Redirect Handling
//!
//! By default, a client follows HTTP redirects up to a maximum chain of
//! 10 hops. A `redirect::Policy` customizes this: hop limits, same-host
//! restriction, no-follow, or a custom callback over each [`Attempt`].

mod policy;

pub use policy::{Action, Attempt, Policy};

use http::Method;
use url::Url;

use crate::http::headers::OrderedHeaders;

/// Headers never forwarded to a different origin. Spelled out because the
/// conservative default strips them even when the user set them explicitly.
const SENSITIVE: &[&str] = &["authorization", "cookie", "proxy-authorization"];

/// Whether two URLs share scheme, host and port.
pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Whether two URLs share host and port, any scheme.
pub(crate) fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Drop sensitive headers on cross-origin hops unless forwarding was opted
/// into. `Proxy-*` headers never cross origins.
pub(crate) fn sanitize_headers(
    headers: &mut OrderedHeaders,
    previous: &Url,
    next: &Url,
    forward_all: bool,
) {
    if same_origin(previous, next) {
        return;
    }
    for name in SENSITIVE {
        if !forward_all {
            headers.remove(name);
        }
    }
    // Proxy credentials are scoped to the proxy, not the target.
    headers.remove("proxy-authorization");
    headers.remove("proxy-connection");
}

/// Referer for the next hop: the previous URL stripped of credentials and
/// fragment; https -> http transitions send none.
pub(crate) fn make_referer(previous: &Url, next: &Url) -> Option<String> {
    if previous.scheme() == "https" && next.scheme() == "http" {
        return None;
    }
    let mut referer = previous.clone();
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    referer.set_fragment(None);
    Some(referer.to_string())
}

/// The method rewrite a redirect status implies (RFC 9110 §15.4).
pub(crate) fn redirect_method(status: http::StatusCode, method: &Method) -> Method {
    match status.as_u16() {
        301 | 302 | 303 => {
            if *method == Method::GET || *method == Method::HEAD {
                method.clone()
            } else {
                Method::GET
            }
        }
        _ => method.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    #[test]
    fn sensitive_headers_stripped_cross_origin() {
        let mut headers = OrderedHeaders::new();
        headers.append("Authorization", "Bearer token");
        headers.append("Cookie", "a=1");
        headers.append("X-Keep", "yes");

        sanitize_headers(
            &mut headers,
            &url("https://a.test/"),
            &url("https://b.test/"),
            false,
        );
        assert!(!headers.contains("authorization"));
        assert!(!headers.contains("cookie"));
        assert!(headers.contains("x-keep"));
    }

    #[test]
    fn same_origin_keeps_everything() {
        let mut headers = OrderedHeaders::new();
        headers.append("Authorization", "Bearer token");
        sanitize_headers(
            &mut headers,
            &url("https://a.test/x"),
            &url("https://a.test/y"),
            false,
        );
        assert!(headers.contains("authorization"));
    }

    #[test]
    fn forward_opt_in_keeps_user_headers_cross_origin() {
        let mut headers = OrderedHeaders::new();
        headers.append("Authorization", "Bearer token");
        sanitize_headers(
            &mut headers,
            &url("https://a.test/"),
            &url("https://b.test/"),
            true,
        );
        assert!(headers.contains("authorization"));
    }

    #[test]
    fn referer_downgrade_is_suppressed() {
        assert_eq!(make_referer(&url("https://a.test/p"), &url("http://b.test/")), None);
        assert_eq!(
            make_referer(&url("http://a.test/p?q=1#frag"), &url("http://b.test/")),
            Some("http://a.test/p?q=1".to_string())
        );
    }

    #[test]
    fn method_rewrites_follow_rfc9110() {
        use http::StatusCode;
        assert_eq!(
            redirect_method(StatusCode::SEE_OTHER, &Method::POST),
            Method::GET
        );
        assert_eq!(
            redirect_method(StatusCode::TEMPORARY_REDIRECT, &Method::POST),
            Method::POST
        );
        assert_eq!(
            redirect_method(StatusCode::MOVED_PERMANENTLY, &Method::HEAD),
            Method::HEAD
        );
    }
}
