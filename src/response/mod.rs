//! Response descriptors.
//!
//! A `ResponseDescriptor` owns whatever the transport handed over for the
//! exchange (a pooled connection, a permit) and releases it exactly once,
//! either on `close()` or on drop.

pub mod body;

use std::fmt;

use bytes::Bytes;

pub use body::{BodyStream, ChunkStream, ContentEncoding, ResponseBody};

use crate::error::{Error, Result};
use crate::media_type::{decode_text, MediaType};
use crate::params::ParamContainer;
use crate::request::CONTENT_TYPE;

pub const CONTENT_ENCODING: &str = "Content-Encoding";

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub message: String,
    pub headers: ParamContainer,
}

impl ResponseHead {
    pub fn new(status: u16, message: impl Into<String>, headers: ParamContainer) -> Self {
        Self {
            status,
            message: message.into(),
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first_ignore_case(name)
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.header(CONTENT_TYPE).and_then(MediaType::parse)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something a transport must release once the response is done with.
pub trait TransportResource: Send {
    fn release(&mut self);
}

/// A received response. The body is read at most once.
pub struct ResponseDescriptor {
    head: ResponseHead,
    media_type: Option<MediaType>,
    body: Option<ResponseBody>,
    resource: Option<Box<dyn TransportResource>>,
    closed: bool,
}

impl ResponseDescriptor {
    pub fn new(head: ResponseHead, body: ResponseBody) -> Self {
        let media_type = head.media_type();
        Self {
            head,
            media_type,
            body: Some(body),
            resource: None,
            closed: false,
        }
    }

    /// A response whose body is already in memory and not content-encoded.
    pub fn from_bytes(head: ResponseHead, bytes: impl Into<Bytes>) -> Self {
        Self::new(head, ResponseBody::buffered(bytes))
    }

    /// Attach the transport resource released on close.
    pub fn with_resource(mut self, resource: Box<dyn TransportResource>) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn message(&self) -> &str {
        &self.head.message
    }

    pub fn headers(&self) -> &ParamContainer {
        &self.head.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    pub fn media_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    /// Charset from Content-Type, `utf-8` when unspecified.
    pub fn charset(&self) -> &str {
        self.media_type
            .as_ref()
            .and_then(MediaType::charset)
            .unwrap_or("utf-8")
    }

    /// Read and decode the whole body.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        let body = self
            .take_body()
            .ok_or_else(|| Error::processing_with("response body already consumed", &self.head))?;
        body.collect().await
    }

    /// Read the body as text in the response charset.
    pub async fn text(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        decode_text(&bytes, self.charset())
    }

    /// Hand the body over to a streaming consumer.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        if self.closed {
            return None;
        }
        self.body.take()
    }

    /// Release the transport resource. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.body = None;
        if let Some(mut resource) = self.resource.take() {
            resource.release();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ResponseDescriptor {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResponseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseDescriptor")
            .field("head", &self.head)
            .field("body", &self.body)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
