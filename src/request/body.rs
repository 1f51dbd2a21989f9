//! Request body representations.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream::Stream;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::negotiation::Marshaller;
use crate::transport::TransportError;

/// A boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

type BoxReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// The body of a request. Exactly one representation is active.
#[derive(Debug, Clone)]
pub enum Body {
    /// Text encoded with the request charset.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// A chunk stream, consumed once.
    Stream(StreamBody),
    /// An async reader, consumed once.
    Reader(ReaderBody),
    /// A payload serialized by a marshaller at execution time.
    Marshall(MarshallBody),
}

impl Body {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Body::Stream(StreamBody::new(stream))
    }

    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Body::Reader(ReaderBody::new(reader))
    }

    pub fn marshall(payload: Value) -> Self {
        Body::Marshall(MarshallBody {
            payload,
            marshaller: None,
        })
    }

    /// True when the body is held in memory and can be hashed or replayed.
    pub fn is_buffered(&self) -> bool {
        matches!(self, Body::Text(_) | Body::Bytes(_) | Body::Marshall(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Body::Text(_) => "text",
            Body::Bytes(_) => "bytes",
            Body::Stream(_) => "stream",
            Body::Reader(_) => "reader",
            Body::Marshall(_) => "marshall",
        }
    }

    /// Convert into the form a transport writes.
    ///
    /// Stream and reader bodies hand over their source; a second conversion
    /// fails. Marshall bodies must have been serialized by the sender first.
    pub fn to_wire(&self) -> Result<WireBody, TransportError> {
        match self {
            Body::Text(text) => Ok(WireBody::Bytes(Bytes::from(text.clone()))),
            Body::Bytes(bytes) => Ok(WireBody::Bytes(bytes.clone())),
            Body::Stream(stream) => stream.take().map(WireBody::Stream).ok_or_else(|| {
                TransportError::RequestWrite("stream body already consumed".to_string())
            }),
            Body::Reader(reader) => reader.take().map(WireBody::Stream).ok_or_else(|| {
                TransportError::RequestWrite("reader body already consumed".to_string())
            }),
            Body::Marshall(_) => Err(TransportError::RequestWrite(
                "marshall body reached the transport unserialized".to_string(),
            )),
        }
    }
}

/// Body as handed to a transport.
pub enum WireBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

/// Single-consumption chunk stream.
#[derive(Clone)]
pub struct StreamBody {
    inner: Arc<Mutex<Option<ByteStream>>>,
}

impl StreamBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::pin(stream)))),
        }
    }

    /// Take the stream; `None` once consumed.
    pub fn take(&self) -> Option<ByteStream> {
        self.inner.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody").finish_non_exhaustive()
    }
}

/// Single-consumption async reader.
#[derive(Clone)]
pub struct ReaderBody {
    inner: Arc<Mutex<Option<BoxReader>>>,
}

impl ReaderBody {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Take the reader as a chunk stream; `None` once consumed.
    pub fn take(&self) -> Option<ByteStream> {
        let reader = self.inner.lock().ok().and_then(|mut slot| slot.take())?;
        Some(Box::pin(ReaderStream::new(reader)))
    }
}

impl fmt::Debug for ReaderBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderBody").finish_non_exhaustive()
    }
}

/// A payload plus the marshaller pinned to it, if any.
#[derive(Debug, Clone)]
pub struct MarshallBody {
    pub payload: Value,
    pub marshaller: Option<Arc<dyn Marshaller>>,
}
