//! HTTP CONNECT tunneling through a forward proxy.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{self, Result};
use crate::proxy::ProxyAuth;

/// Establish a CONNECT tunnel to `host:port` over an open proxy stream.
pub async fn establish(
    stream: &mut TcpStream,
    host: &str,
    port: u16,
    auth: Option<&ProxyAuth>,
) -> Result<()> {
    let mut request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: keep-alive\r\n"
    );
    if let Some(auth) = auth {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth.basic_header()));
    }
    request.push_str("\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(error::dial)?;

    // Read until the end of the response head; tunnels answer with an empty
    // body, so nothing beyond the blank line belongs to the proxy.
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > 8192 {
            return Err(error::protocol("oversized CONNECT response".to_string()));
        }
        let n = stream.read(&mut byte).await.map_err(error::dial)?;
        if n == 0 {
            return Err(error::dial("proxy closed during CONNECT"));
        }
        head.push(byte[0]);
    }

    let mut headers = [httparse::EMPTY_HEADER; 16];
    let mut response = httparse::Response::new(&mut headers);
    response
        .parse(&head)
        .map_err(|e| error::protocol(format!("malformed CONNECT response: {e}")))?;

    match response.code {
        Some(200..=299) => Ok(()),
        Some(407) => Err(error::proxy_auth("proxy requires authentication")),
        Some(code) => Err(error::dial(format!("proxy refused CONNECT: {code}"))),
        None => Err(error::protocol("incomplete CONNECT response".to_string())),
    }
}
