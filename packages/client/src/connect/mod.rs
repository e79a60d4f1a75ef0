//! Dialing: produce a byte stream or datagram path to a target through
//! direct TCP/UDP, SOCKS5, HTTP CONNECT or a Unix-domain socket, honoring
//! custom DNS and source-interface binding.

pub(crate) mod socks;
pub(crate) mod tunnel;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream, UdpSocket, UnixStream};

use crate::context::Context;
use crate::dns::Resolve;
use crate::error::{self, Result};
use crate::proxy::ProxyScheme;

pub use socks::TargetAddr;

/// A connected byte stream: TCP or Unix-domain.
#[derive(Debug)]
pub enum Conn {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Conn {
    /// Remote socket address, when the transport has one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Conn::Tcp(stream) => stream.peer_addr().ok(),
            Conn::Unix(_) => None,
        }
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Conn::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Conn::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Conn::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Conn::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Conn::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// A datagram path to a target, possibly through a SOCKS5 UDP relay.
#[derive(Debug)]
pub struct UdpPath {
    pub socket: UdpSocket,
    /// The resolved target address datagrams are for.
    pub target: SocketAddr,
    /// Present when the path goes through a SOCKS5 relay: the relay address
    /// and the control stream that keeps the association alive.
    pub socks_relay: Option<(SocketAddr, TcpStream)>,
    /// Target as the relay header should spell it (`socks5h` keeps the name).
    pub socks_target: Option<TargetAddr>,
}

/// Produces connections according to the client's proxy, DNS and interface
/// configuration.
#[derive(Debug, Clone)]
pub struct Dialer {
    resolver: Arc<dyn Resolve>,
    interface_addr: Option<IpAddr>,
    unix_socket: Option<PathBuf>,
}

impl Dialer {
    pub fn new(
        resolver: Arc<dyn Resolve>,
        interface_addr: Option<IpAddr>,
        unix_socket: Option<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            interface_addr,
            unix_socket,
        }
    }

    pub async fn resolve(&self, ctx: &Context, host: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        ctx.run(self.resolver.resolve(host.to_string())).await
    }

    /// Dial a byte stream to `host:port`, optionally through `proxy`.
    pub async fn dial(
        &self,
        ctx: &Context,
        host: &str,
        port: u16,
        proxy: Option<&ProxyScheme>,
    ) -> Result<Conn> {
        if let Some(path) = &self.unix_socket {
            let stream = ctx
                .run_io(UnixStream::connect(path.clone()), error::dial)
                .await?;
            return Ok(Conn::Unix(stream));
        }

        match proxy {
            None => {
                let stream = self.dial_tcp(ctx, host, port).await?;
                Ok(Conn::Tcp(stream))
            }
            Some(ProxyScheme::Http {
                host: proxy_host,
                port: proxy_port,
                auth,
            }) => {
                let mut stream = self.dial_tcp(ctx, proxy_host, *proxy_port).await?;
                ctx.run(tunnel::establish(&mut stream, host, port, auth.as_ref()))
                    .await?;
                Ok(Conn::Tcp(stream))
            }
            Some(ProxyScheme::Socks5 {
                host: proxy_host,
                port: proxy_port,
                auth,
                remote_dns,
            }) => {
                let mut stream = self.dial_tcp(ctx, proxy_host, *proxy_port).await?;
                let target = self.socks_target(ctx, host, port, *remote_dns).await?;
                ctx.run(socks::connect(&mut stream, &target, auth.as_ref()))
                    .await?;
                Ok(Conn::Tcp(stream))
            }
        }
    }

    /// Dial a datagram path to `host:port` for QUIC, optionally through a
    /// SOCKS5 UDP ASSOCIATE relay.
    pub async fn dial_udp(
        &self,
        ctx: &Context,
        host: &str,
        port: u16,
        proxy: Option<&ProxyScheme>,
    ) -> Result<UdpPath> {
        let target = self.pick_addr(ctx, host, port).await?;
        match proxy {
            None => {
                let socket = self.bind_udp(target).await?;
                Ok(UdpPath {
                    socket,
                    target,
                    socks_relay: None,
                    socks_target: None,
                })
            }
            Some(ProxyScheme::Socks5 {
                host: proxy_host,
                port: proxy_port,
                auth,
                remote_dns,
            }) => {
                let mut control = self.dial_tcp(ctx, proxy_host, *proxy_port).await?;
                let relay = ctx
                    .run(socks::udp_associate(&mut control, auth.as_ref()))
                    .await?;
                let socket = self.bind_udp(relay).await?;
                let socks_target = self.socks_target(ctx, host, port, *remote_dns).await?;
                Ok(UdpPath {
                    socket,
                    target,
                    socks_relay: Some((relay, control)),
                    socks_target: Some(socks_target),
                })
            }
            Some(ProxyScheme::Http { .. }) => Err(error::builder_msg(
                "HTTP proxies cannot carry QUIC; use socks5 or disable HTTP/3",
            )),
        }
    }

    async fn socks_target(
        &self,
        ctx: &Context,
        host: &str,
        port: u16,
        remote_dns: bool,
    ) -> Result<TargetAddr> {
        if remote_dns && host.parse::<IpAddr>().is_err() {
            Ok(TargetAddr::Domain(host.to_string(), port))
        } else {
            let addr = self.pick_addr(ctx, host, port).await?;
            Ok(TargetAddr::Ip(addr))
        }
    }

    async fn pick_addr(&self, ctx: &Context, host: &str, port: u16) -> Result<SocketAddr> {
        let mut addrs = self.resolve(ctx, host).await?;
        // v4 first: a v4-bound endpoint talking to a v6 remote cannot work
        addrs.sort_by_key(|a| matches!(a, IpAddr::V6(_)));
        let ip = match self.interface_addr {
            Some(IpAddr::V4(_)) => addrs.into_iter().find(|a| a.is_ipv4()),
            Some(IpAddr::V6(_)) => addrs.into_iter().find(|a| a.is_ipv6()),
            None => addrs.into_iter().next(),
        }
        .ok_or_else(|| error::dns(format!("no usable address for {host}")))?;
        Ok(SocketAddr::new(ip, port))
    }

    async fn dial_tcp(&self, ctx: &Context, host: &str, port: u16) -> Result<TcpStream> {
        let addr = self.pick_addr(ctx, host, port).await?;
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(error::dial)?;
        if let Some(ip) = self.interface_addr {
            socket
                .bind(SocketAddr::new(ip, 0))
                .map_err(error::dial)?;
        }
        let stream = ctx.run_io(socket.connect(addr), error::dial).await?;
        stream.set_nodelay(true).map_err(error::dial)?;
        tracing::debug!(%addr, "tcp connection established");
        Ok(stream)
    }

    async fn bind_udp(&self, remote: SocketAddr) -> Result<UdpSocket> {
        let local = match (self.interface_addr, remote) {
            (Some(ip), _) => SocketAddr::new(ip, 0),
            (None, SocketAddr::V4(_)) => SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0),
            (None, SocketAddr::V6(_)) => SocketAddr::new(IpAddr::from([0u16; 8]), 0),
        };
        UdpSocket::bind(local).await.map_err(error::dial)
    }
}
