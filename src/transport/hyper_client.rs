//! hyper-util backend (plain HTTP).

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::ext::ReasonPhrase;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::sync::Notify;

use crate::config::{ConfigError, TransportConfig};
use crate::request::{RequestDescriptor, WireBody};
use crate::response::{ContentEncoding, ResponseBody, ResponseDescriptor, ResponseHead, CONTENT_ENCODING};
use crate::transport::exchange::{await_head, SignalingBody};
use crate::transport::{
    error_chain, guard_read_timeout, params_from_header_map, to_http_method, InFlight, TargetSet, Transport,
    TransportError,
};

type HyperBody = UnsyncBoxBody<Bytes, io::Error>;
type HyperClient = Client<HttpConnector, HyperBody>;

/// Transport over the hyper-util pooled client.
#[derive(Debug)]
pub struct HyperTransport {
    /// `None` once closed; dropping the client drops its idle connections.
    client: ArcSwapOption<HyperClient>,
    targets: TargetSet,
    connect_timeout: Duration,
    read_timeout: Duration,
    in_flight: InFlight,
}

impl HyperTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let targets = TargetSet::new(&config.base_urls)?;
        if let Some(url) = targets.bases().iter().find(|url| url.scheme() != "http") {
            return Err(ConfigError::Transport(format!(
                "hyper transport speaks plain http only, cannot reach '{url}'"
            )));
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        tracing::debug!(targets = targets.len(), "Hyper transport ready");

        Ok(Self {
            client: ArcSwapOption::from_pointee(client),
            targets,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            in_flight: InFlight::default(),
        })
    }

    /// Responses currently holding a connection.
    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    fn wire_body(request: &RequestDescriptor) -> Result<HyperBody, TransportError> {
        let body: HyperBody = match request.body() {
            None => Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync(),
            Some(body) => match body.to_wire()? {
                WireBody::Bytes(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
                WireBody::Stream(chunks) => StreamBody::new(chunks.map_ok(Frame::data)).boxed_unsync(),
            },
        };
        Ok(body)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn call(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor, TransportError> {
        let client = self
            .client
            .load_full()
            .ok_or_else(|| TransportError::Connect("transport closed".to_string()))?;

        let url = self.targets.resolve(request.path_query())?;
        let mut builder = http::Request::builder()
            .method(to_http_method(request.method()))
            .uri(url.as_str());
        for (name, value) in request.headers().pairs() {
            builder = builder.header(name, value);
        }
        let written = Arc::new(Notify::new());
        let body = SignalingBody::new(Self::wire_body(request)?, written.clone()).boxed_unsync();
        let outgoing = builder
            .body(body)
            .map_err(|e| TransportError::RequestWrite(format!("request could not be assembled: {e}")))?;

        let read_timeout = request.read_timeout().unwrap_or(self.read_timeout);
        let exchange = async { client.request(outgoing).await.map_err(classify) };
        let response = await_head(exchange, &written, self.connect_timeout + read_timeout, read_timeout).await?;

        let (parts, incoming) = response.into_parts();
        let reason = match parts.extensions.get::<ReasonPhrase>() {
            Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
            None => parts.status.canonical_reason().unwrap_or_default().to_string(),
        };
        let head = ResponseHead::new(parts.status.as_u16(), reason, params_from_header_map(&parts.headers));
        tracing::debug!(url = %url, status = head.status, "Hyper response headers received");

        let encoding = ContentEncoding::from_header(head.header(CONTENT_ENCODING));
        let chunks = incoming
            .into_data_stream()
            .map_err(|e| TransportError::read_failed(error_chain(&e)));
        let body = ResponseBody::streaming(guard_read_timeout(chunks, read_timeout)).with_encoding(encoding);

        Ok(ResponseDescriptor::new(head, body).with_resource(self.in_flight.acquire()))
    }

    async fn close(&self) {
        if self.client.swap(None).is_some() {
            tracing::debug!("Hyper transport closed");
        }
    }

    fn name(&self) -> &'static str {
        "hyper"
    }
}

fn classify(err: hyper_util::client::legacy::Error) -> TransportError {
    let message = error_chain(&err);
    if err.is_connect() {
        return TransportError::Connect(message);
    }
    let cause = StdError::source(&err).and_then(|source| source.downcast_ref::<hyper::Error>());
    match cause {
        Some(e) if e.is_user() || e.is_body_write_aborted() => TransportError::RequestWrite(message),
        Some(e) if e.is_timeout() => TransportError::ResponseRead {
            message,
            timed_out: true,
        },
        _ => TransportError::read_failed(message),
    }
}
