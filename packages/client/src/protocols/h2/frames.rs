//! HTTP/2 frame codecs (RFC 9113 §4-6).
//!
//! Encoding is fingerprint-sensitive: the preface plan renders SETTINGS in
//! the configured identifier order, then the connection WINDOW_UPDATE, then
//! the configured PRIORITY frames, exactly as a server observes them.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::fingerprint::h2::{Http2Settings, Priority};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

const TYPE_DATA: u8 = 0x0;
const TYPE_HEADERS: u8 = 0x1;
const TYPE_PRIORITY: u8 = 0x2;
const TYPE_RST_STREAM: u8 = 0x3;
const TYPE_SETTINGS: u8 = 0x4;
const TYPE_PUSH_PROMISE: u8 = 0x5;
const TYPE_PING: u8 = 0x6;
const TYPE_GOAWAY: u8 = 0x7;
const TYPE_WINDOW_UPDATE: u8 = 0x8;
const TYPE_CONTINUATION: u8 = 0x9;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the negotiated maximum")]
    Oversized(usize),
    #[error("malformed {0} frame")]
    Malformed(&'static str),
}

/// A parsed HTTP/2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    },
    Headers {
        stream_id: u32,
        fragment: Bytes,
        end_stream: bool,
        end_headers: bool,
    },
    Priority {
        stream_id: u32,
        priority: Priority,
    },
    RstStream {
        stream_id: u32,
        error_code: u32,
    },
    Settings {
        ack: bool,
        settings: Vec<(u16, u32)>,
    },
    PushPromise {
        stream_id: u32,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        error_code: u32,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Continuation {
        stream_id: u32,
        fragment: Bytes,
        end_headers: bool,
    },
    /// Extension frames are tolerated and skipped.
    Unknown {
        frame_type: u8,
    },
}

fn header(out: &mut Vec<u8>, len: usize, frame_type: u8, flags: u8, stream_id: u32) {
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.push(frame_type);
    out.push(flags);
    out.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
}

/// SETTINGS frame with identifiers in the given order.
pub fn encode_settings(settings: &[(u16, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + settings.len() * 6);
    header(&mut out, settings.len() * 6, TYPE_SETTINGS, 0, 0);
    for (id, value) in settings {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

pub fn encode_settings_ack() -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    header(&mut out, 0, TYPE_SETTINGS, FLAG_ACK, 0);
    out
}

pub fn encode_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(13);
    header(&mut out, 4, TYPE_WINDOW_UPDATE, 0, stream_id);
    out.extend_from_slice(&(increment & 0x7fff_ffff).to_be_bytes());
    out
}

pub fn encode_priority(priority: &Priority) -> Vec<u8> {
    let mut out = Vec::with_capacity(14);
    header(&mut out, 5, TYPE_PRIORITY, 0, priority.stream_id);
    let mut dep = priority.depends_on & 0x7fff_ffff;
    if priority.exclusive {
        dep |= 0x8000_0000;
    }
    out.extend_from_slice(&dep.to_be_bytes());
    out.push(priority.weight);
    out
}

/// HEADERS carrying a complete HPACK fragment, with the optional priority
/// field the fingerprint attaches.
pub fn encode_headers(
    stream_id: u32,
    fragment: &[u8],
    priority: Option<&Priority>,
    end_stream: bool,
) -> Vec<u8> {
    let mut flags = FLAG_END_HEADERS;
    if end_stream {
        flags |= FLAG_END_STREAM;
    }
    let mut payload = Vec::with_capacity(fragment.len() + 5);
    if let Some(priority) = priority {
        flags |= FLAG_PRIORITY;
        let mut dep = priority.depends_on & 0x7fff_ffff;
        if priority.exclusive {
            dep |= 0x8000_0000;
        }
        payload.extend_from_slice(&dep.to_be_bytes());
        payload.push(priority.weight);
    }
    payload.extend_from_slice(fragment);

    let mut out = Vec::with_capacity(9 + payload.len());
    header(&mut out, payload.len(), TYPE_HEADERS, flags, stream_id);
    out.extend_from_slice(&payload);
    out
}

pub fn encode_data(stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
    let flags = if end_stream { FLAG_END_STREAM } else { 0 };
    let mut out = Vec::with_capacity(9 + data.len());
    header(&mut out, data.len(), TYPE_DATA, flags, stream_id);
    out.extend_from_slice(data);
    out
}

pub fn encode_ping_ack(data: [u8; 8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(17);
    header(&mut out, 8, TYPE_PING, FLAG_ACK, 0);
    out.extend_from_slice(&data);
    out
}

pub fn encode_goaway(last_stream_id: u32, error_code: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(17);
    header(&mut out, 8, TYPE_GOAWAY, 0, 0);
    out.extend_from_slice(&(last_stream_id & 0x7fff_ffff).to_be_bytes());
    out.extend_from_slice(&error_code.to_be_bytes());
    out
}

pub fn encode_rst_stream(stream_id: u32, error_code: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(13);
    header(&mut out, 4, TYPE_RST_STREAM, 0, stream_id);
    out.extend_from_slice(&error_code.to_be_bytes());
    out
}

/// The observable connection opening: preface, ordered SETTINGS, the
/// connection-flow WINDOW_UPDATE when non-zero, then every configured
/// PRIORITY frame, in order.
pub fn connection_preface(settings: &Http2Settings) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(PREFACE);
    let pairs: Vec<(u16, u32)> = settings
        .settings
        .iter()
        .map(|(id, value)| (id.code(), *value))
        .collect();
    out.extend_from_slice(&encode_settings(&pairs));
    if settings.connection_flow != 0 {
        out.extend_from_slice(&encode_window_update(0, settings.connection_flow));
    }
    for priority in &settings.priorities {
        out.extend_from_slice(&encode_priority(priority));
    }
    out
}

/// Pop one frame off `buf` when a complete one is buffered.
pub fn parse(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>, FrameError> {
    if buf.len() < 9 {
        return Ok(None);
    }
    let len = ((buf[0] as usize) << 16) | ((buf[1] as usize) << 8) | buf[2] as usize;
    if len > max_frame_size {
        return Err(FrameError::Oversized(len));
    }
    if buf.len() < 9 + len {
        return Ok(None);
    }

    let frame_type = buf[3];
    let flags = buf[4];
    let stream_id = u32::from_be_bytes([buf[5] & 0x7f, buf[6], buf[7], buf[8]]);
    buf.advance(9);
    let mut payload = buf.split_to(len).freeze();

    let frame = match frame_type {
        TYPE_DATA => {
            let data = strip_padding(payload, flags).ok_or(FrameError::Malformed("DATA"))?;
            Frame::Data {
                stream_id,
                data,
                end_stream: flags & FLAG_END_STREAM != 0,
            }
        }
        TYPE_HEADERS => {
            let mut fragment =
                strip_padding(payload, flags).ok_or(FrameError::Malformed("HEADERS"))?;
            if flags & FLAG_PRIORITY != 0 {
                if fragment.len() < 5 {
                    return Err(FrameError::Malformed("HEADERS"));
                }
                fragment.advance(5);
            }
            Frame::Headers {
                stream_id,
                fragment,
                end_stream: flags & FLAG_END_STREAM != 0,
                end_headers: flags & FLAG_END_HEADERS != 0,
            }
        }
        TYPE_PRIORITY => {
            if payload.len() != 5 {
                return Err(FrameError::Malformed("PRIORITY"));
            }
            let dep = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Frame::Priority {
                stream_id,
                priority: Priority {
                    stream_id,
                    depends_on: dep & 0x7fff_ffff,
                    exclusive: dep & 0x8000_0000 != 0,
                    weight: payload[4],
                },
            }
        }
        TYPE_RST_STREAM => {
            if payload.len() != 4 {
                return Err(FrameError::Malformed("RST_STREAM"));
            }
            Frame::RstStream {
                stream_id,
                error_code: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            }
        }
        TYPE_SETTINGS => {
            if payload.len() % 6 != 0 {
                return Err(FrameError::Malformed("SETTINGS"));
            }
            let mut settings = Vec::with_capacity(payload.len() / 6);
            while payload.remaining() >= 6 {
                settings.push((payload.get_u16(), payload.get_u32()));
            }
            Frame::Settings {
                ack: flags & FLAG_ACK != 0,
                settings,
            }
        }
        TYPE_PUSH_PROMISE => Frame::PushPromise { stream_id },
        TYPE_PING => {
            if payload.len() != 8 {
                return Err(FrameError::Malformed("PING"));
            }
            let mut data = [0u8; 8];
            data.copy_from_slice(&payload);
            Frame::Ping {
                ack: flags & FLAG_ACK != 0,
                data,
            }
        }
        TYPE_GOAWAY => {
            if payload.len() < 8 {
                return Err(FrameError::Malformed("GOAWAY"));
            }
            Frame::GoAway {
                last_stream_id: u32::from_be_bytes([
                    payload[0] & 0x7f,
                    payload[1],
                    payload[2],
                    payload[3],
                ]),
                error_code: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
            }
        }
        TYPE_WINDOW_UPDATE => {
            if payload.len() != 4 {
                return Err(FrameError::Malformed("WINDOW_UPDATE"));
            }
            Frame::WindowUpdate {
                stream_id,
                increment: u32::from_be_bytes([
                    payload[0] & 0x7f,
                    payload[1],
                    payload[2],
                    payload[3],
                ]),
            }
        }
        TYPE_CONTINUATION => Frame::Continuation {
            stream_id,
            fragment: payload,
            end_headers: flags & FLAG_END_HEADERS != 0,
        },
        other => Frame::Unknown { frame_type: other },
    };
    Ok(Some(frame))
}

fn strip_padding(mut payload: Bytes, flags: u8) -> Option<Bytes> {
    if flags & FLAG_PADDED == 0 {
        return Some(payload);
    }
    if payload.is_empty() {
        return None;
    }
    let pad = payload[0] as usize;
    payload.advance(1);
    if pad > payload.len() {
        return None;
    }
    payload.truncate(payload.len() - pad);
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::h2::SettingId;

    fn parse_all(bytes: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = parse(&mut buf, 1 << 24).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn preface_plan_frame_order() {
        let settings = crate::fingerprint::profiles::firefox().h2;
        let plan = connection_preface(&settings);
        assert!(plan.starts_with(PREFACE));

        let frames = parse_all(&plan[PREFACE.len()..]);
        assert!(matches!(
            frames[0],
            Frame::Settings { ack: false, ref settings }
                if settings.first() == Some(&(SettingId::HeaderTableSize.code(), 65536))
        ));
        assert!(matches!(
            frames[1],
            Frame::WindowUpdate { stream_id: 0, increment: 12_517_377 }
        ));
        // Firefox emits six priority frames, streams 3..=13
        let priority_streams: Vec<u32> = frames[2..]
            .iter()
            .map(|f| match f {
                Frame::Priority { stream_id, .. } => *stream_id,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(priority_streams, vec![3, 5, 7, 9, 11, 13]);
    }

    #[test]
    fn settings_identifier_order_is_preserved() {
        let pairs = vec![(3u16, 100u32), (1, 4096), (4, 65535)];
        let bytes = encode_settings(&pairs);
        match parse_all(&bytes).remove(0) {
            Frame::Settings { settings, .. } => assert_eq!(settings, pairs),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn headers_priority_flag_round_trip() {
        let priority = Priority {
            stream_id: 1,
            depends_on: 0,
            exclusive: true,
            weight: 255,
        };
        let bytes = encode_headers(1, b"\x82", Some(&priority), true);
        match parse_all(&bytes).remove(0) {
            Frame::Headers {
                stream_id,
                fragment,
                end_stream,
                end_headers,
            } => {
                assert_eq!(stream_id, 1);
                assert_eq!(&fragment[..], b"\x82");
                assert!(end_stream);
                assert!(end_headers);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let bytes = encode_window_update(0, 1);
        let mut buf = BytesMut::from(&bytes[..5]);
        assert!(parse(&mut buf, 1 << 24).unwrap().is_none());
    }
}
