//! HTTP/2 connection driving over any dialed stream.
//!
//! The connection opens with the fingerprint's exact preface plan (SETTINGS
//! identifier order, WINDOW_UPDATE, PRIORITY frames) and emits request
//! HEADERS with pseudo-headers in the configured permutation followed by
//! regular headers in insertion order. One request is in flight at a time;
//! the connection is returned to its pool slot once the response body ends.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{frames, hpack};
use crate::context::Context;
use crate::error::{self, Error, Result};
use crate::fingerprint::h2::Http2Settings;
use crate::http::headers::OrderedHeaders;

const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;
const DEFAULT_SEND_WINDOW: i64 = 65_535;

const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;

const ERROR_REFUSED_STREAM: u32 = 0x7;

pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Slot a connection parks in between requests.
pub type ConnectionSlot = Arc<Mutex<Option<H2Connection>>>;

/// Decoded response head.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: OrderedHeaders,
}

pub struct H2Connection {
    io: Box<dyn Io>,
    buf: BytesMut,
    decoder: hpack::Decoder,
    settings: Http2Settings,
    next_stream_id: u32,
    peer_max_frame_size: usize,
    send_window: i64,
    stream_send_window: i64,
    peer_initial_window: i64,
    peer_settings_seen: bool,
    gone: bool,
}

impl std::fmt::Debug for H2Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H2Connection")
            .field("next_stream_id", &self.next_stream_id)
            .finish()
    }
}

impl H2Connection {
    /// Open a connection: emit the preface plan and pick up the peer's
    /// SETTINGS as they arrive.
    pub async fn handshake<S: Io + 'static>(
        ctx: &Context,
        io: S,
        settings: Http2Settings,
    ) -> Result<Self> {
        let mut conn = Self {
            io: Box::new(io),
            buf: BytesMut::with_capacity(16 * 1024),
            decoder: hpack::Decoder::new(4096),
            settings,
            next_stream_id: 1,
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            send_window: DEFAULT_SEND_WINDOW,
            stream_send_window: DEFAULT_SEND_WINDOW,
            peer_initial_window: DEFAULT_SEND_WINDOW,
            peer_settings_seen: false,
            gone: false,
        };
        let preface = frames::connection_preface(&conn.settings);
        ctx.run_io(conn.io.write_all(&preface), error::dial).await?;
        ctx.run_io(conn.io.flush(), error::dial).await?;
        tracing::debug!(
            fingerprint = %conn.settings.akamai_fingerprint(),
            "h2 connection preface sent"
        );
        Ok(conn)
    }

    /// Whether the connection can still take a request.
    pub fn is_usable(&self) -> bool {
        !self.gone
    }

    /// Send one request and read the response head. The body is drained
    /// through [`H2Body`].
    pub async fn send_request(
        mut self,
        ctx: &Context,
        fields: Vec<(String, String)>,
        body: Option<Bytes>,
        slot: ConnectionSlot,
    ) -> Result<(ResponseHead, H2Body)> {
        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;
        self.stream_send_window = self.peer_initial_window;

        let fragment = hpack::encode_block(&fields);
        let headers = frames::encode_headers(
            stream_id,
            &fragment,
            self.settings
                .header_priority
                .map(|mut p| {
                    p.stream_id = stream_id;
                    p
                })
                .as_ref(),
            body.is_none(),
        );
        ctx.run_io(self.io.write_all(&headers), error::body).await?;

        if let Some(body) = body {
            self.send_body(ctx, stream_id, body).await?;
        }
        ctx.run_io(self.io.flush(), error::body).await?;

        // Read frames until our response head is complete.
        let mut fragment = BytesMut::new();
        let mut head: Option<ResponseHead> = None;
        loop {
            let frame = self.next_frame(ctx).await?;
            match frame {
                frames::Frame::Headers {
                    stream_id: sid,
                    fragment: piece,
                    end_stream,
                    end_headers,
                } if sid == stream_id => {
                    fragment.extend_from_slice(&piece);
                    if end_headers {
                        let decoded = self.decode_head(&fragment)?;
                        if decoded.status.is_informational() {
                            // 1xx interim response; keep reading.
                            fragment.clear();
                            continue;
                        }
                        if end_stream {
                            return Ok((
                                decoded,
                                H2Body::finished(self, slot),
                            ));
                        }
                        head = Some(decoded);
                        break;
                    }
                }
                frames::Frame::Continuation {
                    stream_id: sid,
                    fragment: piece,
                    end_headers,
                } if sid == stream_id => {
                    fragment.extend_from_slice(&piece);
                    if end_headers {
                        let decoded = self.decode_head(&fragment)?;
                        if decoded.status.is_informational() {
                            fragment.clear();
                            continue;
                        }
                        head = Some(decoded);
                        break;
                    }
                }
                other => self.handle_connection_frame(ctx, other, stream_id).await?,
            }
        }

        let head = head.expect("loop exits with a head");
        Ok((head, H2Body::streaming(self, stream_id, slot)))
    }

    fn decode_head(&mut self, fragment: &[u8]) -> Result<ResponseHead> {
        let fields = self
            .decoder
            .decode(fragment)
            .map_err(|e| error::protocol(format!("HPACK: {e}")))?;
        let mut status = None;
        let mut headers = OrderedHeaders::with_capacity(fields.len());
        for (name, value) in fields {
            if name == ":status" {
                status = StatusCode::from_bytes(value.as_bytes()).ok();
            } else if !name.starts_with(':') {
                headers.append(name, value);
            }
        }
        let status = status.ok_or_else(|| error::protocol("response without :status".to_string()))?;
        Ok(ResponseHead { status, headers })
    }

    async fn send_body(&mut self, ctx: &Context, stream_id: u32, body: Bytes) -> Result<()> {
        let mut offset = 0;
        while offset < body.len() {
            while self.send_window <= 0 || self.stream_send_window <= 0 {
                let frame = self.next_frame(ctx).await?;
                self.handle_connection_frame(ctx, frame, stream_id).await?;
            }
            let window = self.send_window.min(self.stream_send_window) as usize;
            let len = (body.len() - offset)
                .min(self.peer_max_frame_size)
                .min(window);
            let end = offset + len == body.len();
            let frame = frames::encode_data(stream_id, &body[offset..offset + len], end);
            ctx.run_io(self.io.write_all(&frame), error::body).await?;
            self.send_window -= len as i64;
            self.stream_send_window -= len as i64;
            offset += len;
        }
        Ok(())
    }

    /// React to frames that are not part of the current response exchange.
    async fn handle_connection_frame(
        &mut self,
        ctx: &Context,
        frame: frames::Frame,
        our_stream: u32,
    ) -> Result<()> {
        match frame {
            frames::Frame::Settings { ack: false, settings } => {
                for (id, value) in &settings {
                    match *id {
                        SETTINGS_MAX_FRAME_SIZE => {
                            self.peer_max_frame_size = (*value as usize)
                                .clamp(DEFAULT_MAX_FRAME_SIZE, 1 << 24);
                        }
                        SETTINGS_INITIAL_WINDOW_SIZE => {
                            let delta = i64::from(*value) - self.peer_initial_window;
                            self.peer_initial_window = i64::from(*value);
                            self.stream_send_window += delta;
                        }
                        _ => {}
                    }
                }
                self.peer_settings_seen = true;
                let ack = frames::encode_settings_ack();
                ctx.run_io(self.io.write_all(&ack), error::body).await?;
            }
            frames::Frame::Settings { ack: true, .. } => {}
            frames::Frame::Ping { ack: false, data } => {
                let pong = frames::encode_ping_ack(data);
                ctx.run_io(self.io.write_all(&pong), error::body).await?;
            }
            frames::Frame::Ping { ack: true, .. } => {}
            frames::Frame::WindowUpdate { stream_id: 0, increment } => {
                self.send_window += i64::from(increment);
            }
            frames::Frame::WindowUpdate { stream_id, increment } if stream_id == our_stream => {
                self.stream_send_window += i64::from(increment);
            }
            frames::Frame::WindowUpdate { .. } => {}
            frames::Frame::RstStream { stream_id, error_code } if stream_id == our_stream => {
                self.gone = true;
                let name = if error_code == ERROR_REFUSED_STREAM {
                    "REFUSED_STREAM"
                } else {
                    "RST_STREAM"
                };
                return Err(error::protocol(format!("{name} (code {error_code})")));
            }
            frames::Frame::RstStream { .. } => {}
            frames::Frame::GoAway { error_code, .. } => {
                self.gone = true;
                return Err(error::protocol(format!("GOAWAY (code {error_code})")));
            }
            frames::Frame::PushPromise { stream_id } => {
                // Push is disabled in every profile; refuse it.
                let rst = frames::encode_rst_stream(stream_id, ERROR_REFUSED_STREAM);
                ctx.run_io(self.io.write_all(&rst), error::body).await?;
            }
            frames::Frame::Priority { .. }
            | frames::Frame::Unknown { .. }
            | frames::Frame::Data { .. }
            | frames::Frame::Headers { .. }
            | frames::Frame::Continuation { .. } => {}
        }
        Ok(())
    }

    async fn next_frame(&mut self, ctx: &Context) -> Result<frames::Frame> {
        loop {
            if let Some(frame) = frames::parse(&mut self.buf, 1 << 24)
                .map_err(|e| error::protocol(e.to_string()))?
            {
                return Ok(frame);
            }
            let mut chunk = [0u8; 16 * 1024];
            let n = ctx
                .run_io(self.io.read(&mut chunk), error::body)
                .await?;
            if n == 0 {
                self.gone = true;
                return Err(error::body("connection closed by peer"));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn replenish(&mut self, ctx: &Context, stream_id: u32, consumed: usize) -> Result<()> {
        if consumed == 0 {
            return Ok(());
        }
        let mut update = frames::encode_window_update(0, consumed as u32);
        update.extend_from_slice(&frames::encode_window_update(stream_id, consumed as u32));
        ctx.run_io(self.io.write_all(&update), error::body).await
    }
}

/// Streaming response body for one HTTP/2 exchange. Returns the connection
/// to its slot once the stream ends cleanly.
pub struct H2Body {
    conn: Option<H2Connection>,
    stream_id: u32,
    slot: ConnectionSlot,
    done: bool,
}

impl H2Body {
    fn streaming(conn: H2Connection, stream_id: u32, slot: ConnectionSlot) -> Self {
        Self {
            conn: Some(conn),
            stream_id,
            slot,
            done: false,
        }
    }

    fn finished(conn: H2Connection, slot: ConnectionSlot) -> Self {
        let mut body = Self {
            conn: Some(conn),
            stream_id: 0,
            slot,
            done: true,
        };
        body.release();
        body
    }

    /// Next decoded DATA chunk, or `None` at end of stream.
    pub async fn next_chunk(&mut self, ctx: &Context) -> Result<Option<Bytes>> {
        if self.done {
            self.release();
            return Ok(None);
        }
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| error::body("body already completed"))?;
        loop {
            let frame = conn.next_frame(ctx).await?;
            match frame {
                frames::Frame::Data {
                    stream_id,
                    data,
                    end_stream,
                } if stream_id == self.stream_id => {
                    conn.replenish(ctx, self.stream_id, data.len()).await?;
                    if end_stream {
                        self.done = true;
                    }
                    if data.is_empty() && end_stream {
                        self.release();
                        return Ok(None);
                    }
                    if self.done {
                        self.release();
                    }
                    return Ok(Some(data));
                }
                frames::Frame::Headers {
                    stream_id,
                    end_stream: true,
                    ..
                } if stream_id == self.stream_id => {
                    // trailers close the stream
                    self.done = true;
                    self.release();
                    return Ok(None);
                }
                other => conn.handle_connection_frame(ctx, other, self.stream_id).await?,
            }
        }
    }

    fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_usable() {
                *self.slot.lock().expect("connection slot") = Some(conn);
            }
        }
    }
}

impl Drop for H2Body {
    fn drop(&mut self) {
        if self.done {
            self.release();
        }
        // An unfinished body drops the connection with it; a half-read
        // stream cannot be reused without multiplexing.
    }
}
