//! URL normalization for request constructors.
//!
//! Bare authorities default to `https`; an explicit `http://` prefix or an
//! explicit `:80` port selects plain `http`.

use url::Url;

use crate::error::{self, Result};

/// Types accepted wherever a request target is expected.
pub trait IntoUrl {
    fn into_url(self) -> Result<Url>;
}

impl IntoUrl for Url {
    fn into_url(self) -> Result<Url> {
        if self.host_str().is_none() && self.scheme() != "unix" {
            return Err(error::builder_msg(format!("URL has no host: {self}")));
        }
        Ok(self)
    }
}

impl IntoUrl for &str {
    fn into_url(self) -> Result<Url> {
        parse_target(self)
    }
}

impl IntoUrl for String {
    fn into_url(self) -> Result<Url> {
        parse_target(&self)
    }
}

impl IntoUrl for &String {
    fn into_url(self) -> Result<Url> {
        parse_target(self)
    }
}

fn parse_target(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(error::builder_msg("empty URL"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{}://{}", default_scheme(trimmed), trimmed)
    };

    let url = Url::parse(&candidate).map_err(error::builder)?;
    url.into_url()
}

// A bare ":80" authority is the one spot where the legacy scheme wins.
fn default_scheme(authority: &str) -> &'static str {
    let hostport = authority.split(['/', '?', '#']).next().unwrap_or(authority);
    match hostport.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port == "80" => "http",
        _ => "https",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_to_https() {
        let url = "example.com/path".into_url().unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn explicit_port_80_defaults_to_http() {
        let url = "example.com:80/path".into_url().unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port_or_known_default(), Some(80));
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let url = "http://example.com:8080".into_url().unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(8080));
    }
}
