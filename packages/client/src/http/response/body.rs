//! Lazy response body.
//!
//! The handle is a state machine `Unread -> Streaming | Drained -> Released`
//! over a decoder chain: transport chunks, decompression selected by
//! `Content-Encoding`, an optional byte limit, then the sink (memory, file
//! or the caller's reader). Draining happens at most once; with body
//! caching enabled the drained bytes are retained for repeated reads.

use std::io::Write;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::io::AsyncWriteExt;

use crate::context::Context;
use crate::error::{self, Result};
use crate::protocols::TransportBody;

/// Shared scratch-buffer pool; drained bodies return their buffers here.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn take(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .expect("buffer pool")
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(16 * 1024))
    }

    pub fn put(&self, mut buffer: Vec<u8>) {
        const MAX_POOLED: usize = 32;
        const MAX_CAPACITY: usize = 4 * 1024 * 1024;
        if buffer.capacity() > MAX_CAPACITY {
            return;
        }
        buffer.clear();
        let mut buffers = self.buffers.lock().expect("buffer pool");
        if buffers.len() < MAX_POOLED {
            buffers.push(buffer);
        }
    }

    #[cfg(test)]
    pub(crate) fn pooled(&self) -> usize {
        self.buffers.lock().expect("buffer pool").len()
    }
}

/// Content-Encoding selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Encoding {
    pub fn from_header(value: Option<&str>) -> Encoding {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("gzip") | Some("x-gzip") => Encoding::Gzip,
            Some("deflate") => Encoding::Deflate,
            Some("br") => Encoding::Brotli,
            Some("zstd") => Encoding::Zstd,
            _ => Encoding::Identity,
        }
    }
}

/// `io::Write` sink the push decoders drain into; `take()` hands out
/// whatever accumulated since the last call.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.lock().expect("decoder sink"))
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("decoder sink").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Push decoder: compressed chunks in, decoded chunks out.
enum Decoder {
    Identity(SharedSink),
    Gzip(flate2::write::GzDecoder<SharedSink>, SharedSink),
    Deflate(flate2::write::ZlibDecoder<SharedSink>, SharedSink),
    Brotli(Box<brotli::DecompressorWriter<SharedSink>>, SharedSink),
    Zstd(zstd::stream::write::Decoder<'static, SharedSink>, SharedSink),
}

impl Decoder {
    fn new(encoding: Encoding) -> Result<Self> {
        let sink = SharedSink::default();
        Ok(match encoding {
            Encoding::Identity => Decoder::Identity(sink),
            Encoding::Gzip => {
                Decoder::Gzip(flate2::write::GzDecoder::new(sink.clone()), sink)
            }
            Encoding::Deflate => {
                Decoder::Deflate(flate2::write::ZlibDecoder::new(sink.clone()), sink)
            }
            Encoding::Brotli => Decoder::Brotli(
                Box::new(brotli::DecompressorWriter::new(sink.clone(), 8 * 1024)),
                sink,
            ),
            Encoding::Zstd => Decoder::Zstd(
                zstd::stream::write::Decoder::new(sink.clone()).map_err(error::decode)?,
                sink,
            ),
        })
    }

    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        match self {
            Decoder::Identity(sink) => {
                sink.write_all(chunk).map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Gzip(decoder, sink) => {
                decoder.write_all(chunk).map_err(error::decode)?;
                decoder.flush().map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Deflate(decoder, sink) => {
                decoder.write_all(chunk).map_err(error::decode)?;
                decoder.flush().map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Brotli(decoder, sink) => {
                decoder.write_all(chunk).map_err(error::decode)?;
                decoder.flush().map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Zstd(decoder, sink) => {
                decoder.write_all(chunk).map_err(error::decode)?;
                decoder.flush().map_err(error::decode)?;
                Ok(sink.take())
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        match self {
            Decoder::Identity(sink) => Ok(sink.take()),
            Decoder::Gzip(decoder, sink) => {
                decoder.try_finish().map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Deflate(decoder, sink) => {
                decoder.try_finish().map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Brotli(decoder, sink) => {
                decoder.flush().map_err(error::decode)?;
                Ok(sink.take())
            }
            Decoder::Zstd(decoder, sink) => {
                decoder.flush().map_err(error::decode)?;
                Ok(sink.take())
            }
        }
    }
}

enum State {
    Unread {
        stream: TransportBody,
        decoder: Decoder,
    },
    Streaming,
    Drained,
    Released,
}

/// The lazy body handle attached to a [`Response`](super::Response).
pub struct Body {
    state: State,
    ctx: Context,
    limit: Option<u64>,
    cache_enabled: bool,
    cache: Option<Bytes>,
    pool: Arc<BufferPool>,
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Unread { .. } => "unread",
            State::Streaming => "streaming",
            State::Drained => "drained",
            State::Released => "released",
        };
        f.debug_struct("Body").field("state", &state).finish()
    }
}

impl Body {
    pub(crate) fn new(
        stream: TransportBody,
        encoding: Encoding,
        ctx: Context,
        cache_enabled: bool,
        pool: Arc<BufferPool>,
    ) -> Result<Self> {
        Ok(Self {
            state: State::Unread {
                stream,
                decoder: Decoder::new(encoding)?,
            },
            ctx,
            limit: None,
            cache_enabled,
            cache: None,
            pool,
        })
    }

    pub(crate) fn empty(ctx: Context, pool: Arc<BufferPool>) -> Self {
        Self {
            state: State::Drained,
            ctx,
            limit: None,
            cache_enabled: false,
            cache: Some(Bytes::new()),
            pool,
        }
    }

    /// Cap the number of decoded bytes subsequent reads observe.
    pub fn limit(&mut self, max: u64) -> &mut Self {
        self.limit = Some(max);
        self
    }

    /// Drain to memory. With caching enabled, repeated calls return the
    /// same bytes; without, a second call observes an empty drained body.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        if let Some(cache) = &self.cache {
            let mut cached = cache.clone();
            if let Some(limit) = self.limit {
                cached.truncate(limit as usize);
            }
            return Ok(cached);
        }
        match std::mem::replace(&mut self.state, State::Drained) {
            State::Unread {
                mut stream,
                mut decoder,
            } => {
                let mut out = self.pool.take();
                let limit = self.limit;
                let ctx = self.ctx.clone();
                loop {
                    if let Some(limit) = limit {
                        if out.len() as u64 >= limit {
                            break;
                        }
                    }
                    match stream.next_chunk(&ctx).await? {
                        Some(chunk) => {
                            let decoded = decoder.push(&chunk)?;
                            out.extend_from_slice(&decoded);
                        }
                        None => {
                            let tail = decoder.finish()?;
                            out.extend_from_slice(&tail);
                            break;
                        }
                    }
                }
                if let Some(limit) = limit {
                    out.truncate(limit as usize);
                }
                let bytes = Bytes::copy_from_slice(&out);
                self.pool.put(out);
                if self.cache_enabled {
                    self.cache = Some(bytes.clone());
                }
                Ok(bytes)
            }
            State::Streaming => Err(error::body("body handed out via stream()")),
            State::Drained => Ok(Bytes::new()),
            State::Released => Err(error::body("body already released")),
        }
    }

    /// Drain and decode as UTF-8, lossily.
    pub async fn string(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drain and transcode using `charset` (from the Content-Type header or
    /// a meta-tag sniff), defaulting to UTF-8.
    pub async fn text_with_charset(&mut self, charset: Option<&str>) -> Result<String> {
        let bytes = self.bytes().await?;
        let label = charset
            .map(str::to_string)
            .or_else(|| sniff_meta_charset(&bytes));
        let encoding = label
            .and_then(|l| encoding_rs::Encoding::for_label(l.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        let (decoded, _, _) = encoding.decode(&bytes);
        Ok(decoded.into_owned())
    }

    /// Drain and deserialize from JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(error::decode)
    }

    /// Drain, returning the lowercase hex MD5 of the decoded bytes.
    pub async fn md5(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(hex::encode(Md5::digest(&bytes)))
    }

    /// Stream the decoded body to `path`, renaming into place on success.
    pub async fn dump(&mut self, path: impl AsRef<std::path::Path>) -> Result<u64> {
        let path = path.as_ref();
        let tmp = path.with_extension("part");

        match std::mem::replace(&mut self.state, State::Drained) {
            State::Unread {
                mut stream,
                mut decoder,
            } => {
                let mut file = tokio::fs::File::create(&tmp).await.map_err(error::body)?;
                let mut written: u64 = 0;
                let ctx = self.ctx.clone();
                loop {
                    match stream.next_chunk(&ctx).await {
                        Ok(Some(chunk)) => {
                            let decoded = decoder.push(&chunk)?;
                            file.write_all(&decoded).await.map_err(error::body)?;
                            written += decoded.len() as u64;
                        }
                        Ok(None) => {
                            let tail = decoder.finish()?;
                            file.write_all(&tail).await.map_err(error::body)?;
                            written += tail.len() as u64;
                            break;
                        }
                        Err(e) => {
                            drop(file);
                            let _ = tokio::fs::remove_file(&tmp).await;
                            return Err(e);
                        }
                    }
                }
                file.flush().await.map_err(error::body)?;
                drop(file);
                tokio::fs::rename(&tmp, path).await.map_err(error::body)?;
                Ok(written)
            }
            State::Streaming => Err(error::body("body handed out via stream()")),
            State::Drained => {
                let cached = self.cache.clone().unwrap_or_default();
                tokio::fs::write(path, &cached).await.map_err(error::body)?;
                Ok(cached.len() as u64)
            }
            State::Released => Err(error::body("body already released")),
        }
    }

    /// Hand out the decoded stream as an `AsyncRead`. Valid once, and only
    /// before any drain: buffered bytes are lost on reentrant calls.
    pub fn stream(&mut self) -> Result<BodyReader> {
        match std::mem::replace(&mut self.state, State::Streaming) {
            State::Unread { stream, decoder } => Ok(BodyReader {
                stream,
                decoder,
                ctx: self.ctx.clone(),
                buffer: Vec::new(),
                offset: 0,
                done: false,
            }),
            other => {
                self.state = other;
                Err(error::body("stream() is only valid on an unread body"))
            }
        }
    }

    /// Return buffers to the pool. Idempotent; double release is a no-op.
    pub fn release(&mut self) {
        if matches!(self.state, State::Released) {
            return;
        }
        self.state = State::Released;
        self.cache = None;
    }
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    let at = text.find("charset=")? + "charset=".len();
    let rest = &text[at..];
    let rest = rest.trim_start_matches(['"', '\'']);
    let end = rest
        .find(|c: char| c == '"' || c == '\'' || c == '>' || c == ';' || c.is_whitespace())
        .unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

/// Decoded body reader returned by [`Body::stream`].
pub struct BodyReader {
    stream: TransportBody,
    decoder: Decoder,
    ctx: Context,
    buffer: Vec<u8>,
    offset: usize,
    done: bool,
}

impl BodyReader {
    /// Read the next decoded chunk.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.offset < self.buffer.len() {
            let chunk = Bytes::copy_from_slice(&self.buffer[self.offset..]);
            self.buffer.clear();
            self.offset = 0;
            return Ok(Some(chunk));
        }
        if self.done {
            return Ok(None);
        }
        loop {
            match self.stream.next_chunk(&self.ctx).await? {
                Some(chunk) => {
                    let decoded = self.decoder.push(&chunk)?;
                    if !decoded.is_empty() {
                        return Ok(Some(Bytes::from(decoded)));
                    }
                }
                None => {
                    self.done = true;
                    let tail = self.decoder.finish()?;
                    if tail.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(Bytes::from(tail)));
                }
            }
        }
    }
}

impl BodyReader {
    /// Fill `buf` with decoded bytes; `0` at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.offset >= self.buffer.len() {
            match self.next_chunk().await? {
                Some(chunk) => {
                    self.buffer = chunk.to_vec();
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }
        let available = &self.buffer[self.offset..];
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.offset += len;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::TransportBody;

    fn chunked(chunks: Vec<&[u8]>) -> TransportBody {
        TransportBody::Chunks(
            chunks
                .into_iter()
                .map(Bytes::copy_from_slice)
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }

    fn body(stream: TransportBody, encoding: Encoding, cache: bool) -> Body {
        Body::new(
            stream,
            encoding,
            Context::new(),
            cache,
            Arc::new(BufferPool::default()),
        )
        .unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn gzip_decodes_across_chunk_boundaries() {
        let compressed = gzip(b"the quick brown fox jumps over the lazy dog");
        let split = compressed.len() / 2;
        let mut body = body(
            chunked(vec![&compressed[..split], &compressed[split..]]),
            Encoding::Gzip,
            false,
        );
        assert_eq!(
            body.bytes().await.unwrap(),
            Bytes::from_static(b"the quick brown fox jumps over the lazy dog")
        );
    }

    #[tokio::test]
    async fn identity_passthrough_and_limit() {
        let mut body = body(chunked(vec![b"0123456789"]), Encoding::Identity, false);
        body.limit(4);
        assert_eq!(body.bytes().await.unwrap(), Bytes::from_static(b"0123"));
    }

    #[tokio::test]
    async fn cache_returns_equal_bytes_twice() {
        let mut body = body(chunked(vec![b"cached payload"]), Encoding::Identity, true);
        let first = body.bytes().await.unwrap();
        let second = body.bytes().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Bytes::from_static(b"cached payload"));
    }

    #[tokio::test]
    async fn uncached_second_drain_is_empty() {
        let mut body = body(chunked(vec![b"once"]), Encoding::Identity, false);
        assert_eq!(body.bytes().await.unwrap(), Bytes::from_static(b"once"));
        assert_eq!(body.bytes().await.unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn stream_is_only_valid_unread() {
        let mut body = body(chunked(vec![b"x"]), Encoding::Identity, false);
        body.bytes().await.unwrap();
        assert!(body.stream().is_err());
    }

    #[tokio::test]
    async fn stream_reader_yields_decoded_chunks() {
        let compressed = gzip(b"streamed body");
        let mut body = body(chunked(vec![&compressed[..]]), Encoding::Gzip, false);
        let mut reader = body.stream().unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"streamed body");
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let mut body = body(chunked(vec![b"x"]), Encoding::Identity, true);
        body.bytes().await.unwrap();
        body.release();
        body.release();
        assert!(body.bytes().await.is_err());
    }

    #[tokio::test]
    async fn md5_is_lowercase_hex() {
        let mut body = body(chunked(vec![b"hello"]), Encoding::Identity, false);
        assert_eq!(body.md5().await.unwrap(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn charset_sniff_falls_back_to_meta_tag() {
        let html = b"<html><head><meta charset=\"windows-1252\"></head><body>caf\xe9</body></html>";
        let mut body = body(chunked(vec![html]), Encoding::Identity, false);
        let text = body.text_with_charset(None).await.unwrap();
        assert!(text.contains("caf\u{e9}"));
    }

    #[tokio::test]
    async fn dump_writes_and_renames() {
        let dir = std::env::temp_dir().join(format!("guise-dump-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("body.txt");

        let mut body = body(chunked(vec![b"to disk"]), Encoding::Identity, false);
        let written = body.dump(&path).await.unwrap();
        assert_eq!(written, 7);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"to disk");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
