//! SOCKS5 client handshakes (RFC 1928, RFC 1929 username/password auth).
//!
//! TCP CONNECT carries HTTP/1.1 and HTTP/2; UDP ASSOCIATE opens the relay
//! that the QUIC packet adapter wraps for HTTP/3.

use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{self, Result};
use crate::proxy::ProxyAuth;

const VERSION: u8 = 0x05;
const METHOD_NONE: u8 = 0x00;
const METHOD_USERPASS: u8 = 0x02;
const CMD_CONNECT: u8 = 0x01;
const CMD_UDP_ASSOCIATE: u8 = 0x03;
pub(crate) const ATYP_V4: u8 = 0x01;
pub(crate) const ATYP_DOMAIN: u8 = 0x03;
pub(crate) const ATYP_V6: u8 = 0x04;

/// Target address as sent to the proxy: an IP when resolved locally, the
/// hostname when resolution is delegated (`socks5h`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl TargetAddr {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                out.push(ATYP_V4);
                out.extend_from_slice(&addr.ip().octets());
                out.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                out.push(ATYP_V6);
                out.extend_from_slice(&addr.ip().octets());
                out.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Domain(host, port) => {
                out.push(ATYP_DOMAIN);
                out.push(host.len() as u8);
                out.extend_from_slice(host.as_bytes());
                out.extend_from_slice(&port.to_be_bytes());
            }
        }
    }
}

/// Negotiate the auth method and run CONNECT for `target`.
pub async fn connect(
    stream: &mut TcpStream,
    target: &TargetAddr,
    auth: Option<&ProxyAuth>,
) -> Result<()> {
    handshake(stream, auth).await?;
    let reply = request(stream, CMD_CONNECT, target).await?;
    check_reply(reply)
}

/// Run UDP ASSOCIATE; returns the relay address datagrams must be sent to.
/// The control stream must stay open for the lifetime of the association.
pub async fn udp_associate(
    stream: &mut TcpStream,
    auth: Option<&ProxyAuth>,
) -> Result<SocketAddr> {
    handshake(stream, auth).await?;
    // RFC 1928 §7: client states the address it will send from; all-zero
    // lets the proxy accept from our connected source.
    let placeholder = TargetAddr::Ip(SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0));
    let (reply, bound) = request_with_bound(stream, CMD_UDP_ASSOCIATE, &placeholder).await?;
    check_reply(reply)?;
    let mut relay = bound;
    if relay.ip().is_unspecified() {
        // Some proxies answer 0.0.0.0; the relay then lives on the proxy host.
        relay.set_ip(stream.peer_addr().map_err(error::dial)?.ip());
    }
    Ok(relay)
}

async fn handshake(stream: &mut TcpStream, auth: Option<&ProxyAuth>) -> Result<()> {
    let methods: &[u8] = match auth {
        Some(_) => &[METHOD_NONE, METHOD_USERPASS],
        None => &[METHOD_NONE],
    };
    let mut greeting = vec![VERSION, methods.len() as u8];
    greeting.extend_from_slice(methods);
    stream.write_all(&greeting).await.map_err(error::dial)?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.map_err(error::dial)?;
    if choice[0] != VERSION {
        return Err(error::protocol(format!(
            "SOCKS5 proxy answered version {}",
            choice[0]
        )));
    }
    match choice[1] {
        METHOD_NONE => Ok(()),
        METHOD_USERPASS => {
            let auth = auth.ok_or_else(|| error::proxy_auth("proxy requires credentials"))?;
            userpass(stream, auth).await
        }
        0xff => Err(error::proxy_auth("no acceptable SOCKS5 auth method")),
        other => Err(error::protocol(format!(
            "SOCKS5 proxy chose unknown method {other:#04x}"
        ))),
    }
}

async fn userpass(stream: &mut TcpStream, auth: &ProxyAuth) -> Result<()> {
    let user = auth.username.as_bytes();
    let pass = auth.password.as_bytes();
    if user.len() > 255 || pass.len() > 255 {
        return Err(error::builder_msg("SOCKS5 credentials longer than 255 bytes"));
    }
    let mut msg = Vec::with_capacity(3 + user.len() + pass.len());
    msg.push(0x01); // userpass sub-negotiation version
    msg.push(user.len() as u8);
    msg.extend_from_slice(user);
    msg.push(pass.len() as u8);
    msg.extend_from_slice(pass);
    stream.write_all(&msg).await.map_err(error::dial)?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.map_err(error::dial)?;
    if reply[1] != 0x00 {
        return Err(error::proxy_auth("proxy rejected credentials"));
    }
    Ok(())
}

async fn request(stream: &mut TcpStream, cmd: u8, target: &TargetAddr) -> Result<u8> {
    let (reply, _) = request_with_bound(stream, cmd, target).await?;
    Ok(reply)
}

async fn request_with_bound(
    stream: &mut TcpStream,
    cmd: u8,
    target: &TargetAddr,
) -> Result<(u8, SocketAddr)> {
    let mut msg = vec![VERSION, cmd, 0x00];
    target.write_to(&mut msg);
    stream.write_all(&msg).await.map_err(error::dial)?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.map_err(error::dial)?;
    if head[0] != VERSION {
        return Err(error::protocol("malformed SOCKS5 reply".to_string()));
    }

    let bound = match head[3] {
        ATYP_V4 => {
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await.map_err(error::dial)?;
            let ip = IpAddr::from([buf[0], buf[1], buf[2], buf[3]]);
            SocketAddr::new(ip, u16::from_be_bytes([buf[4], buf[5]]))
        }
        ATYP_V6 => {
            let mut buf = [0u8; 18];
            stream.read_exact(&mut buf).await.map_err(error::dial)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            SocketAddr::new(IpAddr::from(octets), u16::from_be_bytes([buf[16], buf[17]]))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.map_err(error::dial)?;
            let mut buf = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut buf).await.map_err(error::dial)?;
            // A domain in BND.ADDR is unusual; treat it as opaque.
            SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0)
        }
        other => {
            return Err(error::protocol(format!(
                "SOCKS5 reply with unknown address type {other:#04x}"
            )))
        }
    };
    Ok((head[1], bound))
}

fn check_reply(reply: u8) -> Result<()> {
    match reply {
        0x00 => Ok(()),
        0x01 => Err(error::dial("SOCKS5: general failure")),
        0x02 => Err(error::dial("SOCKS5: connection not allowed by ruleset")),
        0x03 => Err(error::dial("SOCKS5: network unreachable")),
        0x04 => Err(error::dial("SOCKS5: host unreachable")),
        0x05 => Err(error::dial("SOCKS5: connection refused")),
        0x06 => Err(error::dial("SOCKS5: TTL expired")),
        0x07 => Err(error::protocol("SOCKS5: command not supported".to_string())),
        0x08 => Err(error::dial("SOCKS5: address type not supported")),
        other => Err(error::protocol(format!("SOCKS5: reply code {other:#04x}"))),
    }
}
