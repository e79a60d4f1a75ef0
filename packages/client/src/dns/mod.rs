//! DNS resolution.
//!
//! Three composable resolver flavors: the system configuration, a plain UDP
//! server override, and DNS-over-TLS against a pinned provider. Any of them
//! can be wrapped by the bounded TTL cache.

mod cache;
pub mod providers;
mod resolvers;

use std::fmt;
use std::net::IpAddr;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::error::Result;

pub use cache::CachingResolver;
pub use providers::DotProvider;
pub use resolvers::{DotResolver, SystemResolver, UdpResolver};

/// Failure taxonomy of the resolver stack; wrapped into `Kind::Dns` at the
/// dialer boundary.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("no such host: {0}")]
    NoSuchHost(String),
    #[error("dns lookup timed out")]
    Timeout,
    #[error("dns server refused the query")]
    Refused,
    #[error("dns transport error: {0}")]
    Transport(String),
}

/// An async host-to-addresses resolver.
pub trait Resolve: Send + Sync + fmt::Debug {
    fn resolve(&self, host: String) -> BoxFuture<'static, Result<Vec<IpAddr>>>;

    /// Stable identity string, part of the transport-cache key: two clients
    /// resolving through different servers must not share transports.
    fn identity(&self) -> String;
}

/// Resolver selection accumulated by the builder.
#[derive(Debug, Clone, Default)]
pub enum DnsConfig {
    /// Operating-system resolver.
    #[default]
    System,
    /// Plain UDP DNS to the given server.
    Udp(std::net::SocketAddr),
    /// DNS-over-TLS to a pinned provider.
    OverTls(DotProvider),
}

impl DnsConfig {
    pub(crate) fn build(
        &self,
        cache: Option<(std::time::Duration, usize)>,
    ) -> std::sync::Arc<dyn Resolve> {
        let inner: std::sync::Arc<dyn Resolve> = match self {
            DnsConfig::System => std::sync::Arc::new(SystemResolver::new()),
            DnsConfig::Udp(addr) => std::sync::Arc::new(UdpResolver::new(*addr)),
            DnsConfig::OverTls(provider) => std::sync::Arc::new(DotResolver::new(provider.clone())),
        };
        match cache {
            Some((ttl, max_entries)) => {
                std::sync::Arc::new(CachingResolver::new(inner, ttl, max_entries))
            }
            None => inner,
        }
    }
}
