//! Request orchestration.
//!
//! # Data Flow
//! ```text
//! sender.get("/users/{id}")          → RequestBuilder (sender defaults attached)
//!     → build()                      → RequestDescriptor
//!     → negotiator.prepare()         (marshall payloads become bytes)
//!     → chain.execute()              (interceptors, then the transport)
//!     → ResponseDescriptor
//!         → execute:      returned to the caller, who closes or drops it
//!         → execute_with: handed to a ResponseHandler, then closed
//!         → extract:      unmarshalled into T, then closed
//! ```
//!
//! # Design Decisions
//! - Negotiator, defaults and chain are fixed when the sender is built
//! - `start*` variants spawn onto the configured runtime handle, or the ambient one
//! - The sender never retries; see `resilience::RetryInterceptor`

pub mod handler;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use crate::cache::{CacheStore, CachingInterceptor, FreshnessComputer};
use crate::chain::{ExecutionChain, Interceptor, MetricsInterceptor, RequestIdInterceptor};
use crate::config::{ClientConfig, TransportKind};
use crate::error::Result;
use crate::negotiation::ContentNegotiator;
use crate::request::{Method, RequestBuilder, RequestDefaults, RequestDescriptor};
use crate::resilience::RetryInterceptor;
use crate::response::ResponseDescriptor;
use crate::transport::{deliver, CallHandle, HyperTransport, ReqwestTransport, Transport, TransportCallback};

pub use handler::{Extracted, ResponseExtractor, ResponseHandler};

use handler::extract_typed;

struct SenderInner {
    chain: ExecutionChain,
    negotiator: ContentNegotiator,
    defaults: Arc<RequestDefaults>,
    executor: Option<Handle>,
}

/// Entry point for issuing requests. Cheap to clone.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<SenderInner>,
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("chain", &self.inner.chain)
            .field("negotiator", &self.inner.negotiator)
            .field("defaults", &self.inner.defaults)
            .finish()
    }
}

impl Sender {
    pub fn builder(transport: Arc<dyn Transport>) -> SenderBuilder {
        SenderBuilder::new(transport)
    }

    /// Build the transport and interceptor stack a configuration describes.
    ///
    /// Interceptors run in this order: metrics, request ids, cache, retries.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = match config.transport.kind {
            TransportKind::Hyper => Arc::new(HyperTransport::new(&config.transport)?),
            TransportKind::Reqwest => Arc::new(ReqwestTransport::new(&config.transport)?),
        };

        let mut builder = SenderBuilder::new(transport).defaults(config.defaults.to_request_defaults()?);

        if config.observability.metrics_enabled {
            builder = builder.interceptor(Arc::new(MetricsInterceptor));
        }
        if config.observability.request_ids {
            builder = builder.interceptor(Arc::new(RequestIdInterceptor));
        }
        if config.cache.enabled {
            builder = builder.interceptor(Arc::new(CachingInterceptor::new(
                CacheStore::new(config.cache.max_entries),
                FreshnessComputer::new(config.cache.fallback_ttl_secs),
            )));
        }
        if config.retries.enabled {
            builder = builder.interceptor(Arc::new(RetryInterceptor::new(&config.retries)));
        }

        let sender = builder.build();
        tracing::debug!(
            transport = sender.transport().name(),
            interceptors = sender.inner.chain.len(),
            "Sender configured"
        );
        Ok(sender)
    }

    /// Start a request with the sender's defaults attached.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::with_defaults(method, path, Arc::clone(&self.inner.defaults))
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Get, path)
    }

    pub fn head(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Head, path)
    }

    pub fn options(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Options, path)
    }

    pub fn trace(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Trace, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Post, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Put, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Patch, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Delete, path)
    }

    pub fn negotiator(&self) -> &ContentNegotiator {
        &self.inner.negotiator
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.inner.chain.transport()
    }

    /// Send a request. The caller owns the response and closes or drops it.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor> {
        let prepared = self.inner.negotiator.prepare(request)?;
        tracing::debug!(
            method = %prepared.method(),
            path = %prepared.path_query(),
            "Executing request"
        );
        let response = self.inner.chain.execute(&prepared).await?;
        tracing::debug!(
            method = %prepared.method(),
            path = %prepared.path_query(),
            status = response.status(),
            "Response received"
        );
        Ok(response)
    }

    /// Send a request and hand the outcome to `handler`. The response is
    /// closed once the handler returns.
    pub async fn execute_with<H>(&self, request: &RequestDescriptor, handler: &H)
    where
        H: ResponseHandler + ?Sized,
    {
        match self.execute(request).await {
            Ok(mut response) => {
                let outcome = handler.on_success(request, &mut response).await;
                response.close();
                if let Err(e) = outcome {
                    handler.on_failure(request, &e).await;
                }
            }
            Err(e) => handler.on_failure(request, &e).await,
        }
    }

    /// Send a request and unmarshall its body into `T`.
    pub async fn extract<T: DeserializeOwned>(&self, request: &RequestDescriptor) -> Result<Extracted<T>> {
        let mut response = self.execute(request).await?;
        let extracted = extract_typed(&self.inner.negotiator, &mut response).await;
        response.close();
        extracted
    }

    /// Send a request and turn the response into a value with `extractor`.
    pub async fn extract_with<E>(&self, request: &RequestDescriptor, extractor: &E) -> Result<E::Output>
    where
        E: ResponseExtractor + ?Sized,
    {
        let mut response = self.execute(request).await?;
        let extracted = extractor.extract(request, &mut response).await;
        response.close();
        extracted
    }

    /// Spawn `execute`.
    pub fn start(&self, request: RequestDescriptor) -> CallHandle<ResponseDescriptor> {
        let sender = self.clone();
        self.spawn(async move { sender.execute(&request).await })
    }

    /// Spawn `extract`.
    pub fn start_extract<T>(&self, request: RequestDescriptor) -> CallHandle<Extracted<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let sender = self.clone();
        self.spawn(async move { sender.extract(&request).await })
    }

    /// Spawn `execute_with`.
    pub fn start_with<H>(&self, request: RequestDescriptor, handler: Arc<H>) -> CallHandle<()>
    where
        H: ResponseHandler + ?Sized + 'static,
    {
        let sender = self.clone();
        self.spawn(async move {
            sender.execute_with(&request, handler.as_ref()).await;
            Ok(())
        })
    }

    /// Spawn a call that reports through the transport callback protocol.
    ///
    /// Without interceptors the transport drives the callback itself.
    pub fn start_with_callback(
        &self,
        request: RequestDescriptor,
        callback: Arc<dyn TransportCallback>,
    ) -> CallHandle<()> {
        let sender = self.clone();
        self.spawn(async move {
            let inner = &sender.inner;
            match inner.negotiator.prepare(&request) {
                Ok(prepared) if inner.chain.is_empty() => {
                    inner.chain.transport().call_with_callback(&prepared, callback.as_ref()).await;
                }
                Ok(prepared) => deliver(inner.chain.execute(&prepared).await, callback.as_ref()).await,
                Err(e) => deliver(Err(e), callback.as_ref()).await,
            }
            Ok(())
        })
    }

    /// Close the transport. Later calls fail with a connect error.
    pub async fn close(&self) {
        self.transport().close().await;
        tracing::debug!(transport = self.transport().name(), "Sender closed");
    }

    fn spawn<T, F>(&self, future: F) -> CallHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let task = match &self.inner.executor {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        };
        CallHandle::new(task)
    }
}

/// Assembles a [`Sender`]. Interceptors run in the order they are added.
pub struct SenderBuilder {
    transport: Arc<dyn Transport>,
    negotiator: ContentNegotiator,
    interceptors: Vec<Arc<dyn Interceptor>>,
    defaults: RequestDefaults,
    executor: Option<Handle>,
}

impl SenderBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            negotiator: ContentNegotiator::with_defaults(),
            interceptors: Vec::new(),
            defaults: RequestDefaults::default(),
            executor: None,
        }
    }

    pub fn negotiator(mut self, negotiator: ContentNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn interceptors<I>(mut self, interceptors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Interceptor>>,
    {
        self.interceptors.extend(interceptors);
        self
    }

    pub fn defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Runtime the `start*` variants spawn onto.
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    pub fn build(self) -> Sender {
        Sender {
            inner: Arc::new(SenderInner {
                chain: ExecutionChain::new(self.interceptors, self.transport),
                negotiator: self.negotiator,
                defaults: Arc::new(self.defaults),
                executor: self.executor,
            }),
        }
    }
}
