//! Transport contract and backends.
//!
//! # Architecture
//! ```text
//! Next::run ──► Transport::call(&RequestDescriptor)
//!                 ├─ HyperTransport   (hyper-util legacy client)
//!                 └─ ReqwestTransport (reqwest::Client)
//!               ◄── ResponseDescriptor (status + headers ready, body lazy)
//! ```
//!
//! Backend failures are normalized here into three classes: connect,
//! request write and response read (timeouts included).

pub mod callback;
mod exchange;
pub mod hyper_client;
pub mod reqwest_client;
pub mod targets;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;

pub use callback::{deliver, TransportCallback};
pub use hyper_client::HyperTransport;
pub use reqwest_client::ReqwestTransport;
pub use targets::TargetSet;

use crate::error::{Error, Result};
use crate::params::ParamContainer;
use crate::request::{Method, RequestDescriptor};
use crate::response::{ChunkStream, ResponseDescriptor, TransportResource};

/// Normalized transport failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    RequestWrite(String),

    #[error("{message}")]
    ResponseRead { message: String, timed_out: bool },
}

impl TransportError {
    pub fn read_timeout(after: Duration) -> Self {
        TransportError::ResponseRead {
            message: format!("no data received within {after:?}"),
            timed_out: true,
        }
    }

    pub fn read_failed(message: impl Into<String>) -> Self {
        TransportError::ResponseRead {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::ResponseRead { timed_out: true, .. })
    }
}

/// A backend able to execute request descriptors.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send the request; completes once the status line and headers arrived.
    async fn call(&self, request: &RequestDescriptor) -> std::result::Result<ResponseDescriptor, TransportError>;

    /// Send the request and report progress through `callback`.
    ///
    /// Every applicable event fires, in protocol order, before the future
    /// completes.
    async fn call_with_callback(&self, request: &RequestDescriptor, callback: &dyn TransportCallback) {
        deliver(self.call(request).await.map_err(Error::from), callback).await;
    }

    /// Release backend resources. Later calls fail with a connect error.
    async fn close(&self) {}

    fn name(&self) -> &'static str;
}

pub(crate) fn to_http_method(method: Method) -> http::Method {
    match method {
        Method::Get => http::Method::GET,
        Method::Head => http::Method::HEAD,
        Method::Options => http::Method::OPTIONS,
        Method::Trace => http::Method::TRACE,
        Method::Post => http::Method::POST,
        Method::Put => http::Method::PUT,
        Method::Patch => http::Method::PATCH,
        Method::Delete => http::Method::DELETE,
    }
}

/// Copy response headers, decoding values lossily.
pub(crate) fn params_from_header_map(headers: &http::HeaderMap) -> ParamContainer {
    let mut params = ParamContainer::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        // HeaderName is never blank.
        let _ = params.add_one(name.as_str(), value);
    }
    params
}

/// Fail a body stream that stays silent for longer than `timeout`.
pub(crate) fn guard_read_timeout<S>(chunks: S, timeout: Duration) -> ChunkStream
where
    S: Stream<Item = std::result::Result<Bytes, TransportError>> + Send + 'static,
{
    stream::unfold(Some(chunks.boxed()), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(timeout, inner.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
            Ok(Some(Err(err))) => Some((Err(err), None)),
            Ok(None) => None,
            Err(_) => Some((Err(TransportError::read_timeout(timeout)), None)),
        }
    })
    .boxed()
}

/// Render an error with its source chain.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Counts responses whose body is still held by a caller.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn current(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) -> Box<dyn TransportResource> {
        self.0.fetch_add(1, Ordering::AcqRel);
        Box::new(InFlightPermit(self.0.clone()))
    }
}

struct InFlightPermit(Arc<AtomicUsize>);

impl TransportResource for InFlightPermit {
    fn release(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to a spawned call.
///
/// Canceling abandons the wait; a request already written is not recalled.
#[derive(Debug)]
pub struct CallHandle<T> {
    task: JoinHandle<Result<T>>,
}

impl<T> CallHandle<T> {
    pub(crate) fn new(task: JoinHandle<Result<T>>) -> Self {
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Future for CallHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join)) if join.is_cancelled() => Poll::Ready(Err(Error::Canceled)),
            Poll::Ready(Err(join)) => Poll::Ready(Err(Error::processing(format!("call task failed: {join}")))),
        }
    }
}
