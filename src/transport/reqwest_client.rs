//! reqwest backend.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::ext::ReasonPhrase;
use tokio::sync::Notify;

use crate::config::{ConfigError, TransportConfig};
use crate::request::{RequestDescriptor, WireBody};
use crate::response::{ContentEncoding, ResponseBody, ResponseDescriptor, ResponseHead, CONTENT_ENCODING};
use crate::transport::exchange::{await_head, SignalingBody};
use crate::transport::{
    error_chain, guard_read_timeout, params_from_header_map, to_http_method, InFlight, TargetSet, Transport,
    TransportError,
};

type ReqwestBody = BoxBody<Bytes, io::Error>;

/// Transport over `reqwest::Client`. TLS is handled by reqwest.
#[derive(Debug)]
pub struct ReqwestTransport {
    /// `None` once closed.
    client: ArcSwapOption<reqwest::Client>,
    targets: TargetSet,
    connect_timeout: Duration,
    read_timeout: Duration,
    in_flight: InFlight,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let targets = TargetSet::new(&config.base_urls)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ConfigError::Transport(error_chain(&e)))?;

        tracing::debug!(targets = targets.len(), "Reqwest transport ready");

        Ok(Self {
            client: ArcSwapOption::from_pointee(client),
            targets,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            in_flight: InFlight::default(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    fn wire_body(request: &RequestDescriptor) -> Result<ReqwestBody, TransportError> {
        let body: ReqwestBody = match request.body() {
            None => Empty::<Bytes>::new().map_err(|never| match never {}).boxed(),
            Some(body) => match body.to_wire()? {
                WireBody::Bytes(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed(),
                WireBody::Stream(chunks) => StreamBody::new(chunks.map_ok(Frame::data)).boxed(),
            },
        };
        Ok(body)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor, TransportError> {
        let client = self
            .client
            .load_full()
            .ok_or_else(|| TransportError::Connect("transport closed".to_string()))?;

        let url = self.targets.resolve(request.path_query())?;
        let mut builder = client.request(to_http_method(request.method()), url.clone());
        for (name, value) in request.headers().pairs() {
            builder = builder.header(name, value);
        }
        let written = Arc::new(Notify::new());
        builder = builder.body(reqwest::Body::wrap(SignalingBody::new(
            Self::wire_body(request)?,
            written.clone(),
        )));

        let read_timeout = request.read_timeout().unwrap_or(self.read_timeout);
        let exchange = async { builder.send().await.map_err(|e| classify(&e)) };
        let response = await_head(exchange, &written, self.connect_timeout + read_timeout, read_timeout).await?;

        let status = response.status();
        let reason = match response.extensions().get::<ReasonPhrase>() {
            Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
            None => status.canonical_reason().unwrap_or_default().to_string(),
        };
        let head = ResponseHead::new(status.as_u16(), reason, params_from_header_map(response.headers()));
        tracing::debug!(url = %url, status = head.status, "Reqwest response headers received");

        let encoding = ContentEncoding::from_header(head.header(CONTENT_ENCODING));
        let chunks = response.bytes_stream().map_err(|e| classify_read(&e));
        let body = ResponseBody::streaming(guard_read_timeout(chunks, read_timeout)).with_encoding(encoding);

        Ok(ResponseDescriptor::new(head, body).with_resource(self.in_flight.acquire()))
    }

    async fn close(&self) {
        if self.client.swap(None).is_some() {
            tracing::debug!("Reqwest transport closed");
        }
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

fn classify(err: &reqwest::Error) -> TransportError {
    let message = error_chain(err);
    if err.is_connect() {
        TransportError::Connect(message)
    } else if err.is_timeout() {
        TransportError::ResponseRead {
            message,
            timed_out: true,
        }
    } else if err.is_builder() || err.is_request() {
        TransportError::RequestWrite(message)
    } else {
        TransportError::read_failed(message)
    }
}

fn classify_read(err: &reqwest::Error) -> TransportError {
    TransportError::ResponseRead {
        message: error_chain(err),
        timed_out: err.is_timeout(),
    }
}
