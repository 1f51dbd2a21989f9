//! Media-type negotiation for request and response bodies.
//!
//! # Selection
//! ```text
//! marshallers:   [(predicate over request, Marshaller)]           first match wins
//! unmarshallers: [(media range, status range, Unmarshaller)]      first match wins
//! ```
//!
//! Registration order is the tie-break, so specific entries go first.
//! Registries are filled before the sender is built and never change after.

pub mod codecs;

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::ops::RangeInclusive;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

pub use codecs::{FormCodec, JsonCodec, TextCodec};

use crate::error::{Error, Result};
use crate::media_type::{encode_text, MediaRange, MediaType};
use crate::request::{Body, RequestDescriptor};
use crate::response::ResponseHead;

/// Serializes a payload into a request body.
pub trait Marshaller: Send + Sync + fmt::Debug {
    fn write(&self, payload: &Value, out: &mut dyn io::Write, charset: &str) -> Result<()>;
}

/// Deserializes a response body into a payload.
pub trait Unmarshaller: Send + Sync + fmt::Debug {
    fn unmarshall(&self, body: &[u8], head: &ResponseHead) -> Result<Value>;
}

type RequestPredicate = Arc<dyn Fn(&RequestDescriptor) -> bool + Send + Sync>;

#[derive(Clone)]
struct MarshallerEntry {
    label: String,
    accepts: RequestPredicate,
    marshaller: Arc<dyn Marshaller>,
}

#[derive(Clone)]
struct UnmarshallerEntry {
    range: MediaRange,
    statuses: RangeInclusive<u16>,
    unmarshaller: Arc<dyn Unmarshaller>,
}

impl UnmarshallerEntry {
    fn supports(&self, status: u16, media: Option<&MediaType>) -> bool {
        self.statuses.contains(&status) && self.range.matches_opt(media)
    }
}

/// Ordered marshaller and unmarshaller registries.
#[derive(Clone, Default)]
pub struct ContentNegotiator {
    marshallers: Vec<MarshallerEntry>,
    unmarshallers: Vec<UnmarshallerEntry>,
}

impl ContentNegotiator {
    /// Empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON, form and text handlers, unmarshallers claiming 2xx.
    pub fn with_defaults() -> Self {
        let json = Arc::new(JsonCodec);
        let form = Arc::new(FormCodec);
        let text = Arc::new(TextCodec);
        let mut negotiator = Self::new();
        negotiator
            .register_codec("application/json", json.clone(), json.clone())
            .register_codec("*/*+json", json.clone(), json)
            .register_codec("application/x-www-form-urlencoded", form.clone(), form)
            .register_codec("text/*", text.clone(), text);
        negotiator
    }

    fn register_codec(
        &mut self,
        range: &str,
        marshaller: Arc<dyn Marshaller>,
        unmarshaller: Arc<dyn Unmarshaller>,
    ) -> &mut Self {
        if let Some(range) = MediaRange::parse(range) {
            self.register_marshaller(range.clone(), marshaller);
            self.register_unmarshaller(range, 200..=299, unmarshaller);
        }
        self
    }

    /// Select `marshaller` for requests whose Content-Type falls in `range`.
    pub fn register_marshaller(&mut self, range: MediaRange, marshaller: Arc<dyn Marshaller>) -> &mut Self {
        let label = range.to_string();
        self.marshallers.push(MarshallerEntry {
            label,
            accepts: Arc::new(move |request: &RequestDescriptor| range.matches_opt(request.content_type().as_ref())),
            marshaller,
        });
        self
    }

    /// Select `marshaller` for requests accepted by an arbitrary predicate.
    pub fn register_marshaller_when<F>(
        &mut self,
        label: impl Into<String>,
        accepts: F,
        marshaller: Arc<dyn Marshaller>,
    ) -> &mut Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        self.marshallers.push(MarshallerEntry {
            label: label.into(),
            accepts: Arc::new(accepts),
            marshaller,
        });
        self
    }

    /// Select `unmarshaller` for responses in `range` with a status in
    /// `statuses`.
    pub fn register_unmarshaller(
        &mut self,
        range: MediaRange,
        statuses: RangeInclusive<u16>,
        unmarshaller: Arc<dyn Unmarshaller>,
    ) -> &mut Self {
        self.unmarshallers.push(UnmarshallerEntry {
            range,
            statuses,
            unmarshaller,
        });
        self
    }

    pub fn find_marshaller(&self, request: &RequestDescriptor) -> Option<&Arc<dyn Marshaller>> {
        self.marshallers
            .iter()
            .find(|entry| (entry.accepts)(request))
            .map(|entry| &entry.marshaller)
    }

    pub fn find_unmarshaller(&self, status: u16, media: Option<&MediaType>) -> Option<&Arc<dyn Unmarshaller>> {
        self.unmarshallers
            .iter()
            .find(|entry| entry.supports(status, media))
            .map(|entry| &entry.unmarshaller)
    }

    /// True when some unmarshaller claims the response.
    pub fn can_unmarshall(&self, head: &ResponseHead) -> bool {
        self.find_unmarshaller(head.status, head.media_type().as_ref()).is_some()
    }

    /// Turn the request body into bytes ready for the wire.
    ///
    /// Marshall payloads are serialized; text in a non UTF-8 charset is
    /// re-encoded. Other requests come back borrowed.
    pub fn prepare<'a>(&self, request: &'a RequestDescriptor) -> Result<Cow<'a, RequestDescriptor>> {
        match request.body() {
            Some(Body::Marshall(marshall)) => {
                let marshaller = match &marshall.marshaller {
                    Some(pinned) => pinned,
                    None => self.find_marshaller(request).ok_or_else(|| {
                        Error::processing(format!(
                            "no marshaller registered for Content-Type '{}'",
                            request.header(crate::request::CONTENT_TYPE).unwrap_or("<none>")
                        ))
                    })?,
                };
                let mut out = Vec::new();
                marshaller.write(&marshall.payload, &mut out, request.charset())?;
                tracing::debug!(
                    marshaller = ?marshaller,
                    bytes = out.len(),
                    "Serialized request payload"
                );
                Ok(Cow::Owned(request.with_body(Body::Bytes(Bytes::from(out)))))
            }
            Some(Body::Text(text)) if !is_utf8(request.charset()) => {
                let encoded = encode_text(text, request.charset())?;
                Ok(Cow::Owned(request.with_body(Body::Bytes(Bytes::from(encoded)))))
            }
            _ => Ok(Cow::Borrowed(request)),
        }
    }

    /// Deserialize a response body with the unmarshaller claiming it.
    pub fn deserialize(&self, head: &ResponseHead, body: &[u8]) -> Result<Value> {
        let media = head.media_type();
        let unmarshaller = self.find_unmarshaller(head.status, media.as_ref()).ok_or_else(|| {
            Error::processing_with(
                format!(
                    "no unmarshaller registered for status {} and media type '{}'",
                    head.status,
                    media.as_ref().map_or_else(|| "<none>".to_string(), MediaType::essence)
                ),
                head,
            )
        })?;
        unmarshaller.unmarshall(body, head)
    }
}

fn is_utf8(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8")
}

impl fmt::Debug for ContentNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marshallers: Vec<&str> = self.marshallers.iter().map(|e| e.label.as_str()).collect();
        let unmarshallers: Vec<String> = self
            .unmarshallers
            .iter()
            .map(|e| format!("{} {}..={}", e.range, e.statuses.start(), e.statuses.end()))
            .collect();
        f.debug_struct("ContentNegotiator")
            .field("marshallers", &marshallers)
            .field("unmarshallers", &unmarshallers)
            .finish()
    }
}
