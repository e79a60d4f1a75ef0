//! HTTP/3 over quiche.
//!
//! The QUIC Initial shape comes from the fingerprint's [`QuicSpec`]: source
//! connection-id length, datagram sizing and the flow-control posture are
//! projected onto `quiche::Config`, the H3 SETTINGS values onto
//! `quiche::h3::Config`. Datagrams travel through the packet adapter, so a
//! SOCKS5 UDP ASSOCIATE relay is transparent to the protocol driving.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use quiche::h3::NameValue;
use tokio::net::TcpStream;

use crate::connect::{TargetAddr, UdpPath};
use crate::context::Context;
use crate::error::{self, Result};
use crate::fingerprint::quic::QuicSpec;
use crate::http::headers::OrderedHeaders;
use crate::quic::PacketConn;

const MAX_DATAGRAM_SIZE: usize = 1350;

/// Decoded response head, mirroring the H2 layer's shape.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: OrderedHeaders,
}

pub struct H3Connection {
    conn: quiche::Connection,
    h3: Option<quiche::h3::Connection>,
    packet: PacketConn,
    target: TargetAddr,
    local: SocketAddr,
    peer: SocketAddr,
    send_buf: Vec<u8>,
    recv_buf: Vec<u8>,
    // Keeps the SOCKS5 association open for the connection's lifetime.
    _control: Option<TcpStream>,
}

impl std::fmt::Debug for H3Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H3Connection")
            .field("peer", &self.peer)
            .finish()
    }
}

fn quic_config(spec: &QuicSpec, verify: bool) -> Result<quiche::Config> {
    let mut config = quiche::Config::new(quiche::PROTOCOL_VERSION).map_err(error::quic)?;
    config
        .set_application_protos(&[b"h3"])
        .map_err(error::quic)?;
    config.verify_peer(verify);
    config.set_max_idle_timeout(30_000);
    config.set_max_recv_udp_payload_size(MAX_DATAGRAM_SIZE.max(spec.udp_datagram_min_size));
    config.set_max_send_udp_payload_size(MAX_DATAGRAM_SIZE.max(spec.udp_datagram_min_size));
    // Browser-sized flow control windows.
    config.set_initial_max_data(15 * 1024 * 1024);
    config.set_initial_max_stream_data_bidi_local(6 * 1024 * 1024);
    config.set_initial_max_stream_data_bidi_remote(6 * 1024 * 1024);
    config.set_initial_max_stream_data_uni(1024 * 1024);
    config.set_initial_max_streams_bidi(100);
    config.set_initial_max_streams_uni(100);
    config.set_disable_active_migration(true);
    Ok(config)
}

fn h3_config(spec: &QuicSpec) -> Result<quiche::h3::Config> {
    let mut config = quiche::h3::Config::new().map_err(error::quic)?;
    for (id, value) in &spec.h3_settings {
        match *id {
            crate::fingerprint::quic::h3_setting::QPACK_MAX_TABLE_CAPACITY => {
                config.set_qpack_max_table_capacity(*value);
            }
            crate::fingerprint::quic::h3_setting::MAX_FIELD_SECTION_SIZE => {
                config.set_max_field_section_size(*value);
            }
            crate::fingerprint::quic::h3_setting::QPACK_BLOCKED_STREAMS => {
                config.set_qpack_blocked_streams(*value);
            }
            // Remaining identifiers (H3_DATAGRAM, GREASE entries) are part
            // of the fingerprint identity but outside the engine surface.
            _ => {}
        }
    }
    Ok(config)
}

impl H3Connection {
    /// Establish QUIC + H3 over a dialed datagram path.
    pub async fn establish(
        ctx: &Context,
        path: UdpPath,
        host: &str,
        spec: &QuicSpec,
        verify: bool,
    ) -> Result<Self> {
        let mut config = quic_config(spec, verify)?;

        let UdpPath {
            socket,
            target,
            socks_relay,
            socks_target,
        } = path;

        let local = socket.local_addr().map_err(error::dial)?;
        let (packet, control, wire_target) = match socks_relay {
            Some((relay, control)) => {
                let wire = socks_target.unwrap_or(TargetAddr::Ip(target));
                (
                    PacketConn::socks5(socket, relay, Some(wire.clone())),
                    Some(control),
                    wire,
                )
            }
            None => (PacketConn::raw(socket, target), None, TargetAddr::Ip(target)),
        };
        packet
            .set_read_buffer(2 * 1024 * 1024)
            .map_err(crate::quic::packet_conn_error)?;
        packet
            .set_write_buffer(2 * 1024 * 1024)
            .map_err(crate::quic::packet_conn_error)?;

        let scid_bytes = spec.generate_scid();
        let scid = quiche::ConnectionId::from_ref(&scid_bytes);
        let conn = quiche::connect(Some(host), &scid, local, target, &mut config)
            .map_err(error::quic)?;

        let mut this = Self {
            conn,
            h3: None,
            packet,
            target: wire_target,
            local,
            peer: target,
            send_buf: vec![0u8; 65_535],
            recv_buf: vec![0u8; 65_535],
            _control: control,
        };

        // Drive the handshake to completion.
        this.flush_egress(ctx).await?;
        while !this.conn.is_established() {
            if this.conn.is_closed() {
                return Err(error::quic("connection closed during handshake"));
            }
            this.pump(ctx).await?;
        }
        tracing::debug!(host, "quic handshake complete");

        let h3 = quiche::h3::Connection::with_transport(&mut this.conn, &h3_config(spec)?)
            .map_err(error::quic)?;
        this.h3 = Some(h3);
        this.flush_egress(ctx).await?;
        Ok(this)
    }

    pub fn is_usable(&self) -> bool {
        !self.conn.is_closed()
    }

    /// Send one request; `fields` carries pseudo-headers first, already in
    /// the fingerprint's permutation.
    pub async fn send_request(
        &mut self,
        ctx: &Context,
        fields: &[(String, String)],
        body: Option<&[u8]>,
    ) -> Result<u64> {
        let headers: Vec<quiche::h3::Header> = fields
            .iter()
            .map(|(name, value)| quiche::h3::Header::new(name.as_bytes(), value.as_bytes()))
            .collect();

        let h3 = self.h3.as_mut().ok_or_else(|| error::quic("h3 not ready"))?;
        let stream_id = h3
            .send_request(&mut self.conn, &headers, body.is_none())
            .map_err(error::quic)?;
        if let Some(body) = body {
            let mut offset = 0;
            while offset < body.len() {
                let h3 = self.h3.as_mut().expect("h3 established");
                match h3.send_body(&mut self.conn, stream_id, &body[offset..], true) {
                    Ok(written) => offset += written,
                    Err(quiche::h3::Error::Done) => {
                        self.pump(ctx).await?;
                    }
                    Err(e) => return Err(error::quic(e)),
                }
            }
        }
        self.flush_egress(ctx).await?;
        Ok(stream_id)
    }

    /// Wait for the response head of `stream_id`.
    pub async fn read_response(
        &mut self,
        ctx: &Context,
        stream_id: u64,
    ) -> Result<ResponseHead> {
        loop {
            let event = self.next_event(ctx).await?;
            match event {
                (sid, quiche::h3::Event::Headers { list, .. }) if sid == stream_id => {
                    let mut status = None;
                    let mut headers = OrderedHeaders::with_capacity(list.len());
                    for header in &list {
                        let name = String::from_utf8_lossy(header.name());
                        let value = String::from_utf8_lossy(header.value());
                        if name == ":status" {
                            status = StatusCode::from_bytes(value.as_bytes()).ok();
                        } else if !name.starts_with(':') {
                            headers.append(name.into_owned(), value.into_owned());
                        }
                    }
                    let status = status
                        .ok_or_else(|| error::protocol("response without :status".to_string()))?;
                    if status.is_informational() {
                        continue;
                    }
                    return Ok(ResponseHead { status, headers });
                }
                (sid, quiche::h3::Event::Finished) if sid == stream_id => {
                    return Err(error::protocol("stream finished before headers".to_string()));
                }
                (sid, quiche::h3::Event::Reset(code)) if sid == stream_id => {
                    return Err(error::protocol(format!("RST_STREAM (code {code})")));
                }
                _ => {}
            }
        }
    }

    /// Read the next body chunk of `stream_id`; `None` at end of stream.
    pub async fn next_chunk(
        &mut self,
        ctx: &Context,
        stream_id: u64,
    ) -> Result<Option<Bytes>> {
        loop {
            // Drain pending body data before polling for new events.
            let h3 = self.h3.as_mut().ok_or_else(|| error::quic("h3 not ready"))?;
            match h3.recv_body(&mut self.conn, stream_id, &mut self.recv_buf) {
                Ok(n) => {
                    self.flush_egress(ctx).await?;
                    return Ok(Some(Bytes::copy_from_slice(&self.recv_buf[..n])));
                }
                Err(quiche::h3::Error::Done) => {}
                Err(e) => return Err(error::quic(e)),
            }

            let event = self.next_event(ctx).await?;
            match event {
                (sid, quiche::h3::Event::Finished) if sid == stream_id => {
                    return Ok(None);
                }
                (sid, quiche::h3::Event::Reset(code)) if sid == stream_id => {
                    return Err(error::protocol(format!("RST_STREAM (code {code})")));
                }
                _ => {}
            }
        }
    }

    /// Close gracefully; used by `close_idle_connections`.
    pub fn close(&mut self) {
        let _ = self.conn.close(true, 0x100, b"done");
    }

    async fn next_event(&mut self, ctx: &Context) -> Result<(u64, quiche::h3::Event)> {
        loop {
            if let Some(h3) = self.h3.as_mut() {
                match h3.poll(&mut self.conn) {
                    Ok(event) => {
                        self.flush_egress(ctx).await?;
                        return Ok(event);
                    }
                    Err(quiche::h3::Error::Done) => {}
                    Err(e) => return Err(error::quic(e)),
                }
            }
            self.pump(ctx).await?;
        }
    }

    /// One network turn: wait for ingress (bounded by the QUIC timer),
    /// feed it to the connection, then flush egress.
    async fn pump(&mut self, ctx: &Context) -> Result<()> {
        let timer = self.conn.timeout().unwrap_or(Duration::from_secs(1));
        let mut buf = vec![0u8; 65_535];
        let read = tokio::select! {
            read = self.packet.read_from(&mut buf) => Some(read),
            _ = tokio::time::sleep(timer) => None,
        };
        ctx.check()?;
        match read {
            Some(Ok((len, _source))) => {
                let info = quiche::RecvInfo {
                    from: self.peer,
                    to: self.local,
                };
                if let Err(e) = self.conn.recv(&mut buf[..len], info) {
                    if !matches!(e, quiche::Error::Done) {
                        return Err(map_quic_error(e));
                    }
                }
            }
            Some(Err(e)) => return Err(crate::quic::packet_conn_error(e)),
            None => self.conn.on_timeout(),
        }
        self.flush_egress(ctx).await
    }

    async fn flush_egress(&mut self, ctx: &Context) -> Result<()> {
        loop {
            match self.conn.send(&mut self.send_buf) {
                Ok((len, _info)) => {
                    ctx.check()?;
                    self.packet
                        .write_to(&self.send_buf[..len], &self.target)
                        .await
                        .map_err(crate::quic::packet_conn_error)?;
                }
                Err(quiche::Error::Done) => return Ok(()),
                Err(e) => return Err(map_quic_error(e)),
            }
        }
    }
}

fn map_quic_error(e: quiche::Error) -> crate::error::Error {
    match e {
        quiche::Error::UnknownVersion => error::quic("version negotiation required"),
        quiche::Error::TlsFail => error::quic("QUIC TLS handshake failed"),
        other => error::quic(other),
    }
}

/// Streaming response body for one HTTP/3 exchange.
pub struct H3Body {
    pub(crate) stream_id: u64,
    pub(crate) slot: std::sync::Arc<std::sync::Mutex<Option<H3Connection>>>,
    pub(crate) conn: Option<H3Connection>,
    pub(crate) done: bool,
}

impl H3Body {
    pub fn new(
        conn: H3Connection,
        stream_id: u64,
        slot: std::sync::Arc<std::sync::Mutex<Option<H3Connection>>>,
    ) -> Self {
        Self {
            stream_id,
            slot,
            conn: Some(conn),
            done: false,
        }
    }

    pub async fn next_chunk(&mut self, ctx: &Context) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| error::body("body already completed"))?;
        match conn.next_chunk(ctx, self.stream_id).await? {
            Some(chunk) => Ok(Some(chunk)),
            None => {
                self.done = true;
                if let Some(conn) = self.conn.take() {
                    if conn.is_usable() {
                        *self.slot.lock().expect("h3 slot") = Some(conn);
                    }
                }
                Ok(None)
            }
        }
    }
}
