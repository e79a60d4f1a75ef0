//! HTTP cookies and the session jar.

use std::fmt;
use std::sync::{Arc, RwLock};

use url::Url;

/// Actions for a persistent cookie store providing session support.
pub trait CookieStore: Send + Sync {
    /// Store `Set-Cookie` values received from `url`.
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &str>, url: &Url);
    /// The `Cookie` header value for `url`, filtered by domain, path and
    /// the secure attribute.
    fn cookies(&self, url: &Url) -> Option<String>;
}

/// The default `CookieStore`, backed by a public-suffix-aware store shared
/// across every request of a session-enabled client.
#[derive(Debug, Default)]
pub struct Jar(RwLock<cookie_store::CookieStore>);

impl Jar {
    /// Add a cookie in `Set-Cookie` format, scoped to `url`.
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        let cookies = cookie::Cookie::parse(cookie)
            .ok()
            .map(|c| c.into_owned())
            .into_iter();
        self.0
            .write()
            .expect("cookie jar poisoned")
            .store_response_cookies(cookies, url);
    }

    /// Explicitly store `(name, value)` pairs for `url`.
    pub fn add_cookies(&self, pairs: &[(String, String)], url: &Url) {
        let cookies = pairs
            .iter()
            .map(|(name, value)| cookie::Cookie::new(name.clone(), value.clone()));
        self.0
            .write()
            .expect("cookie jar poisoned")
            .store_response_cookies(cookies, url);
    }
}

impl CookieStore for Jar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &str>, url: &Url) {
        let cookies = cookie_headers.filter_map(|header| {
            cookie::Cookie::parse(header.to_owned())
                .map_err(|e| tracing::warn!(error = %e, "invalid Set-Cookie"))
                .ok()
        });
        self.0
            .write()
            .expect("cookie jar poisoned")
            .store_response_cookies(cookies, url);
    }

    fn cookies(&self, url: &Url) -> Option<String> {
        let value = self
            .0
            .read()
            .expect("cookie jar poisoned")
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Shared handle to the session jar.
#[derive(Clone)]
pub struct SharedJar(pub Arc<dyn CookieStore>);

impl fmt::Debug for SharedJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedJar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_filters_by_domain() {
        let jar = Jar::default();
        let url = Url::parse("https://example.com/").unwrap();
        jar.add_cookie_str("session=abc; Path=/", &url);

        assert_eq!(jar.cookies(&url), Some("session=abc".to_string()));
        let other = Url::parse("https://other.test/").unwrap();
        assert_eq!(jar.cookies(&other), None);
    }

    #[test]
    fn secure_cookies_skip_plaintext() {
        let jar = Jar::default();
        let https = Url::parse("https://example.com/").unwrap();
        jar.add_cookie_str("token=1; Secure", &https);

        let http = Url::parse("http://example.com/").unwrap();
        assert_eq!(jar.cookies(&http), None);
        assert!(jar.cookies(&https).is_some());
    }

    #[test]
    fn set_cookies_accumulate() {
        let jar = Jar::default();
        let url = Url::parse("https://example.com/").unwrap();
        jar.add_cookies(
            &[
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ],
            &url,
        );
        let header = jar.cookies(&url).unwrap();
        assert!(header.contains("a=1"));
        assert!(header.contains("b=2"));
    }
}
