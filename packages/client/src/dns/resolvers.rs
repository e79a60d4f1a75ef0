//! Resolver implementations over the [hickory-resolver](https://github.com/hickory-dns/hickory-dns) crate.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{ResolveError, TokioResolver};
use once_cell::sync::OnceCell;

use super::{DnsError, DotProvider, Resolve};
use crate::error::{self, Result};

fn classify(host: &str, err: ResolveError) -> DnsError {
    let text = err.to_string();
    if text.contains("no records found") || text.contains("NXDomain") {
        DnsError::NoSuchHost(host.to_string())
    } else if text.contains("timed out") {
        DnsError::Timeout
    } else if text.contains("Refused") {
        DnsError::Refused
    } else {
        DnsError::Transport(text)
    }
}

async fn lookup(resolver: &TokioResolver, host: String) -> Result<Vec<IpAddr>> {
    let lookup = resolver
        .lookup_ip(host.as_str())
        .await
        .map_err(|e| error::dns(classify(&host, e)))?;
    let addrs: Vec<IpAddr> = lookup.iter().collect();
    if addrs.is_empty() {
        return Err(error::dns(DnsError::NoSuchHost(host)));
    }
    Ok(addrs)
}

/// Resolver using the operating-system DNS configuration.
#[derive(Debug, Default, Clone)]
pub struct SystemResolver {
    // Construction reads system config; delayed until first use.
    state: Arc<OnceCell<TokioResolver>>,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Resolve for SystemResolver {
    fn resolve(&self, host: String) -> BoxFuture<'static, Result<Vec<IpAddr>>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let resolver = state
                .get_or_try_init(|| {
                    TokioResolver::builder_tokio()
                        .map(|builder| builder.build())
                        .map_err(|e| error::dns(DnsError::Transport(e.to_string())))
                })?
                .clone();
            lookup(&resolver, host).await
        })
    }

    fn identity(&self) -> String {
        "system".to_string()
    }
}

/// Plain UDP DNS against one configured server.
#[derive(Debug, Clone)]
pub struct UdpResolver {
    server: SocketAddr,
    state: Arc<OnceCell<TokioResolver>>,
}

impl UdpResolver {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            state: Arc::new(OnceCell::new()),
        }
    }

    fn build(&self) -> TokioResolver {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(self.server, Protocol::Udp));
        TokioResolver::builder_with_config(config, TokioConnectionProvider::default()).build()
    }
}

impl Resolve for UdpResolver {
    fn resolve(&self, host: String) -> BoxFuture<'static, Result<Vec<IpAddr>>> {
        let this = self.clone();
        Box::pin(async move {
            let resolver = this.state.get_or_init(|| this.build()).clone();
            lookup(&resolver, host).await
        })
    }

    fn identity(&self) -> String {
        format!("udp/{}", self.server)
    }
}

/// DNS-over-TLS against a pinned provider. The underlying connection pool
/// (one TLS session per server, ALPN `dot`, reconnect on idle) is managed by
/// hickory's TLS name-server transport.
#[derive(Debug, Clone)]
pub struct DotResolver {
    provider: DotProvider,
    state: Arc<OnceCell<TokioResolver>>,
}

impl DotResolver {
    pub fn new(provider: DotProvider) -> Self {
        Self {
            provider,
            state: Arc::new(OnceCell::new()),
        }
    }

    fn build(&self) -> TokioResolver {
        let mut config = ResolverConfig::new();
        for addr in self.provider.addresses() {
            let mut ns = NameServerConfig::new(addr, Protocol::Tls);
            ns.tls_dns_name = Some(self.provider.sni.clone().into());
            config.add_name_server(ns);
        }
        TokioResolver::builder_with_config(config, TokioConnectionProvider::default()).build()
    }
}

impl Resolve for DotResolver {
    fn resolve(&self, host: String) -> BoxFuture<'static, Result<Vec<IpAddr>>> {
        let this = self.clone();
        Box::pin(async move {
            let resolver = this.state.get_or_init(|| this.build()).clone();
            lookup(&resolver, host).await
        })
    }

    fn identity(&self) -> String {
        format!("dot/{}/{}", self.provider.sni, self.provider.primary)
    }
}
