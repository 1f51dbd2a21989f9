//! Request descriptors and their builder.
//!
//! # Data Flow
//! ```text
//! sender.post("/items/{id}")          (RequestBuilder, sender defaults attached)
//!     → .param / .header / .json      (sigils classified on entry)
//!     → build()
//!         → path_query.rs (path expansion, matrix, query encoding)
//!         → content-type + charset resolution
//!         → fingerprint.rs (only for cacheable requests)
//!     → RequestDescriptor             (immutable, reusable)
//! ```
//!
//! # Design Decisions
//! - Every validation happens in `build()`; nothing fails later for a shape problem
//! - Identical builder calls produce byte-identical path+query and headers
//! - Interceptors derive new descriptors instead of mutating one

pub mod body;
pub mod builder;
pub mod fingerprint;
pub mod method;
pub mod path_query;

use std::time::Duration;

pub use body::{Body, ByteStream, MarshallBody, WireBody};
pub use builder::{RequestBuilder, RequestDefaults};
pub use fingerprint::Fingerprint;
pub use method::Method;

use crate::error::Result;
use crate::media_type::MediaType;
use crate::params::ParamContainer;

pub const CONTENT_TYPE: &str = "Content-Type";

/// An immutable, fully resolved request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path_template: String,
    path_query: String,
    headers: ParamContainer,
    body: Option<Body>,
    read_timeout: Option<Duration>,
    fingerprint: Option<Fingerprint>,
    charset: String,
}

impl RequestDescriptor {
    pub fn method(&self) -> Method {
        self.method
    }

    /// The template the request was built from, e.g. `/users/{id}`.
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Resolved path, matrix segments and query, e.g. `/users/7;v=2?q=x`.
    pub fn path_query(&self) -> &str {
        &self.path_query
    }

    /// The path portion of `path_query`.
    pub fn path(&self) -> &str {
        self.path_query
            .split_once('?')
            .map_or(self.path_query.as_str(), |(path, _)| path)
    }

    /// The query portion of `path_query`, without `?`.
    pub fn query(&self) -> Option<&str> {
        self.path_query.split_once('?').map(|(_, query)| query)
    }

    pub fn headers(&self) -> &ParamContainer {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first_ignore_case(name)
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Per-request override of the transport read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Cache key; present only for requests built with `cached()`.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn content_type(&self) -> Option<MediaType> {
        self.header(CONTENT_TYPE).and_then(MediaType::parse)
    }

    /// Charset the body is encoded with.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// True when the body (if any) can be sent more than once.
    pub fn is_replayable(&self) -> bool {
        self.body.as_ref().map_or(true, Body::is_buffered)
    }

    /// A copy of this request with `name` set to `value`.
    ///
    /// The fingerprint is carried over unchanged so derived requests keep the
    /// cache key of their origin.
    pub fn with_header(&self, name: &str, value: impl Into<String>) -> Result<Self> {
        let mut derived = self.clone();
        derived.headers.set(name, [value.into()])?;
        Ok(derived)
    }

    /// A copy of this request carrying `body` instead.
    pub(crate) fn with_body(&self, body: Body) -> Self {
        let mut derived = self.clone();
        derived.body = Some(body);
        derived
    }
}
