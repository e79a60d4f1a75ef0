//! HTTP/1.1 over a dialed stream, driven through hyper's connection API.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use crate::context::Context;
use crate::error::{self, Result};
use crate::http::headers::OrderedHeaders;

/// Parked sender for connection reuse between sequential requests.
pub type SenderSlot = Arc<Mutex<Option<http1::SendRequest<Full<Bytes>>>>>;

#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: OrderedHeaders,
}

/// Response body fed by hyper's incoming stream.
pub struct H1Body {
    incoming: Option<hyper::body::Incoming>,
    sender: Option<http1::SendRequest<Full<Bytes>>>,
    slot: SenderSlot,
}

impl H1Body {
    pub async fn next_chunk(&mut self, ctx: &Context) -> Result<Option<Bytes>> {
        let incoming = match self.incoming.as_mut() {
            Some(incoming) => incoming,
            None => return Ok(None),
        };
        loop {
            let frame = ctx
                .run(async {
                    incoming
                        .frame()
                        .await
                        .transpose()
                        .map_err(error::body)
                })
                .await?;
            match frame {
                Some(frame) => {
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                    // trailers: skip and keep polling
                }
                None => {
                    self.incoming = None;
                    // stream ended cleanly: park the sender for reuse
                    if let Some(sender) = self.sender.take() {
                        if sender.is_ready() {
                            *self.slot.lock().expect("h1 slot") = Some(sender);
                        }
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// Open an HTTP/1.1 connection over `io`, spawning the driver task.
pub async fn handshake<S>(ctx: &Context, io: S) -> Result<http1::SendRequest<Full<Bytes>>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = ctx
        .run(async {
            http1::Builder::new()
                .title_case_headers(true)
                .handshake::<_, Full<Bytes>>(TokioIo::new(io))
                .await
                .map_err(error::dial)
        })
        .await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "h1 connection task ended");
        }
    });
    Ok(sender)
}

/// Send one request over an established sender.
pub async fn send_request(
    ctx: &Context,
    sender: http1::SendRequest<Full<Bytes>>,
    method: &Method,
    url: &Url,
    headers: &OrderedHeaders,
    body: Option<Bytes>,
    slot: SenderSlot,
) -> Result<(ResponseHead, H1Body)> {
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    let mut builder = http::Request::builder().method(method.clone()).uri(path);
    // Host leads, the way browsers put it, unless the caller pinned one.
    if !headers.contains("host") {
        let host_value = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        if !host_value.is_empty() {
            builder = builder.header(http::header::HOST, host_value);
        }
    }
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }

    let request = builder
        .body(Full::new(body.unwrap_or_default()))
        .map_err(error::builder)?;
    dispatch(ctx, sender, request, slot).await
}

async fn dispatch(
    ctx: &Context,
    mut sender: http1::SendRequest<Full<Bytes>>,
    request: http::Request<Full<Bytes>>,
    slot: SenderSlot,
) -> Result<(ResponseHead, H1Body)> {
    let response = ctx
        .run(async { sender.send_request(request).await.map_err(error::body) })
        .await?;

    let (parts, incoming) = response.into_parts();
    let mut headers = OrderedHeaders::with_capacity(parts.headers.len());
    for (name, value) in parts.headers.iter() {
        headers.append(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }

    Ok((
        ResponseHead {
            status: parts.status,
            headers,
        },
        H1Body {
            incoming: Some(incoming),
            sender: Some(sender),
            slot,
        },
    ))
}
