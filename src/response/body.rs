//! Lazily-read response bodies with transparent content decoding.

use std::fmt;
use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use flate2::write;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::{Error, Result};
use crate::transport::TransportError;

/// Chunks as read off the wire, before content decoding.
pub type ChunkStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// Chunks after content decoding.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// The `Content-Encoding` applied to a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Map a `Content-Encoding` header value. Unknown codings pass through
    /// undecoded.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => ContentEncoding::Gzip,
            Some("deflate") => ContentEncoding::Deflate,
            Some("identity") | Some("") | None => ContentEncoding::Identity,
            Some(other) => {
                tracing::debug!(encoding = other, "Unsupported content encoding left as is");
                ContentEncoding::Identity
            }
        }
    }

    pub fn decode(self, raw: Bytes) -> Result<Bytes> {
        // HEAD, 204 and 304 carry the header without a payload.
        if raw.is_empty() {
            return Ok(raw);
        }
        match self {
            ContentEncoding::Identity => Ok(raw),
            ContentEncoding::Gzip => read_all(MultiGzDecoder::new(&raw[..]), "gzip"),
            // Servers disagree on whether deflate means zlib-wrapped or raw.
            ContentEncoding::Deflate => read_all(ZlibDecoder::new(&raw[..]), "deflate")
                .or_else(|_| read_all(DeflateDecoder::new(&raw[..]), "deflate")),
        }
    }
}

fn read_all(mut decoder: impl Read, coding: &str) -> Result<Bytes> {
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::processing(format!("{coding} body could not be decoded: {e}")))?;
    Ok(Bytes::from(decoded))
}

fn decode_failed(coding: &str, err: io::Error) -> Error {
    Error::processing(format!("{coding} body could not be decoded: {err}"))
}

/// Incremental decoder fed one wire chunk at a time.
enum ChunkDecoder {
    Gzip(write::MultiGzDecoder<Vec<u8>>),
    Zlib(write::ZlibDecoder<Vec<u8>>),
    RawDeflate(write::DeflateDecoder<Vec<u8>>),
    /// Deflate input buffered until the first two bytes show whether a
    /// zlib header is present.
    Sniffing(Vec<u8>),
}

impl ChunkDecoder {
    fn new(encoding: ContentEncoding) -> Option<Self> {
        match encoding {
            ContentEncoding::Identity => None,
            ContentEncoding::Gzip => Some(ChunkDecoder::Gzip(write::MultiGzDecoder::new(Vec::new()))),
            ContentEncoding::Deflate => Some(ChunkDecoder::Sniffing(Vec::new())),
        }
    }

    fn coding(&self) -> &'static str {
        match self {
            ChunkDecoder::Gzip(_) => "gzip",
            _ => "deflate",
        }
    }

    /// Feed a chunk and return whatever output it completed.
    fn push(&mut self, chunk: &[u8]) -> Result<Bytes> {
        let coding = self.coding();
        self.feed(chunk).map_err(|e| decode_failed(coding, e))
    }

    fn feed(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        let out = match self {
            ChunkDecoder::Sniffing(pending) => {
                pending.extend_from_slice(chunk);
                if pending.len() < 2 {
                    return Ok(Bytes::new());
                }
                let pending = std::mem::take(pending);
                *self = if is_zlib_header(pending[0], pending[1]) {
                    ChunkDecoder::Zlib(write::ZlibDecoder::new(Vec::new()))
                } else {
                    ChunkDecoder::RawDeflate(write::DeflateDecoder::new(Vec::new()))
                };
                return self.feed(&pending);
            }
            ChunkDecoder::Gzip(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                decoder.get_mut()
            }
            ChunkDecoder::Zlib(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                decoder.get_mut()
            }
            ChunkDecoder::RawDeflate(decoder) => {
                decoder.write_all(chunk)?;
                decoder.flush()?;
                decoder.get_mut()
            }
        };
        Ok(Bytes::from(std::mem::take(out)))
    }

    /// Flush the tail once the wire stream ended.
    fn finish(self) -> Result<Bytes> {
        let coding = self.coding();
        let out = match self {
            ChunkDecoder::Sniffing(pending) if pending.is_empty() => Ok(Vec::new()),
            ChunkDecoder::Sniffing(pending) => {
                let mut decoder = write::DeflateDecoder::new(Vec::new());
                decoder.write_all(&pending).and_then(|_| decoder.finish())
            }
            ChunkDecoder::Gzip(decoder) => decoder.finish(),
            ChunkDecoder::Zlib(decoder) => decoder.finish(),
            ChunkDecoder::RawDeflate(decoder) => decoder.finish(),
        };
        out.map(Bytes::from).map_err(|e| decode_failed(coding, e))
    }
}

fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0F == 8 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

enum Source {
    Buffered(Bytes),
    Streaming(ChunkStream),
}

/// A response body, read at most once.
pub struct ResponseBody {
    source: Source,
    encoding: ContentEncoding,
}

impl ResponseBody {
    pub fn buffered(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Buffered(bytes.into()),
            encoding: ContentEncoding::Identity,
        }
    }

    pub fn streaming(chunks: ChunkStream) -> Self {
        Self {
            source: Source::Streaming(chunks),
            encoding: ContentEncoding::Identity,
        }
    }

    pub fn empty() -> Self {
        Self::buffered(Bytes::new())
    }

    pub fn with_encoding(mut self, encoding: ContentEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    /// Decoded chunks, produced as wire chunks arrive.
    ///
    /// A body that ends without any payload yields nothing, whatever its
    /// declared coding.
    pub fn into_chunks(self) -> BodyStream {
        let chunks: ChunkStream = match self.source {
            Source::Buffered(bytes) if bytes.is_empty() => stream::empty().boxed(),
            Source::Buffered(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Source::Streaming(chunks) => chunks,
        };
        let Some(decoder) = ChunkDecoder::new(self.encoding) else {
            return chunks.map(|chunk| chunk.map_err(Error::from)).boxed();
        };

        stream::unfold(Some((chunks, decoder, false)), |state| async move {
            let (mut chunks, mut decoder, mut seen) = state?;
            loop {
                match chunks.next().await {
                    Some(Ok(raw)) if raw.is_empty() => continue,
                    Some(Ok(raw)) => {
                        seen = true;
                        match decoder.push(&raw) {
                            Ok(out) if out.is_empty() => continue,
                            Ok(out) => return Some((Ok(out), Some((chunks, decoder, seen)))),
                            Err(e) => return Some((Err(e), None)),
                        }
                    }
                    Some(Err(e)) => return Some((Err(Error::from(e)), None)),
                    None if !seen => return None,
                    None => {
                        return match decoder.finish() {
                            Ok(out) if out.is_empty() => None,
                            Ok(out) => Some((Ok(out), None)),
                            Err(e) => Some((Err(e), None)),
                        }
                    }
                }
            }
        })
        .boxed()
    }

    /// Read every chunk and decode.
    ///
    /// Read failures surface as the normalized transport class; decoding
    /// failures as `Processing`.
    pub async fn collect(self) -> Result<Bytes> {
        let encoding = self.encoding;
        let raw = match self.source {
            Source::Buffered(bytes) => bytes,
            Source::Streaming(mut chunks) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = chunks.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                buf.freeze()
            }
        };
        encoding.decode(raw)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Buffered(ref bytes) => format!("buffered({} bytes)", bytes.len()),
            Source::Streaming(_) => "streaming".to_string(),
        };
        f.debug_struct("ResponseBody")
            .field("source", &source)
            .field("encoding", &self.encoding)
            .finish()
    }
}
