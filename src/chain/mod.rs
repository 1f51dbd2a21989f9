//! Execution chain: ordered interceptors around the terminal transport call.
//!
//! # Data Flow
//! ```text
//! Sender::execute
//!     → interceptor[0].intercept(req, next)
//!         → next.run(req) → interceptor[1] ... → Transport::call
//!         ← response (unwinds in reverse order)
//! ```
//!
//! An interceptor may pass through, short-circuit by returning its own
//! response, or call `next` several times. Requests are never mutated; an
//! interceptor that needs different headers derives a new descriptor.

pub mod metrics;
pub mod request_id;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use self::metrics::MetricsInterceptor;
pub use request_id::RequestIdInterceptor;

use crate::error::Result;
use crate::request::RequestDescriptor;
use crate::response::ResponseDescriptor;
use crate::transport::Transport;

/// Middleware around request execution.
#[async_trait]
pub trait Interceptor: Send + Sync + fmt::Debug {
    async fn intercept(&self, request: &RequestDescriptor, next: Next) -> Result<ResponseDescriptor>;
}

/// The remainder of the chain after the current interceptor.
#[derive(Clone)]
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    transport: Arc<dyn Transport>,
}

impl Next {
    /// Run the next interceptor, or the transport once none remain.
    pub async fn run(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor> {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let next = Next {
                    interceptors: Arc::clone(&self.interceptors),
                    index: self.index + 1,
                    transport: Arc::clone(&self.transport),
                };
                interceptor.intercept(request, next).await
            }
            None => Ok(self.transport.call(request).await?),
        }
    }

    /// Interceptors left before the transport.
    pub fn remaining(&self) -> usize {
        self.interceptors.len().saturating_sub(self.index)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.remaining())
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// An immutable, shareable interceptor list bound to a transport.
#[derive(Clone)]
pub struct ExecutionChain {
    head: Next,
}

impl ExecutionChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, transport: Arc<dyn Transport>) -> Self {
        Self {
            head: Next {
                interceptors: interceptors.into(),
                index: 0,
                transport,
            },
        }
    }

    pub async fn execute(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor> {
        self.head.run(request).await
    }

    pub fn is_empty(&self) -> bool {
        self.head.interceptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.head.interceptors.len()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.head.transport
    }
}

impl fmt::Debug for ExecutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionChain")
            .field("interceptors", &self.head.interceptors)
            .field("transport", &self.head.transport)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamContainer;
    use crate::request::{Method, RequestBuilder};
    use crate::response::ResponseHead;
    use crate::transport::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn call(&self, _request: &RequestDescriptor) -> std::result::Result<ResponseDescriptor, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ResponseDescriptor::from_bytes(
                ResponseHead::new(200, "OK", ParamContainer::new()),
                "net",
            ))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[derive(Debug)]
    struct Tracer {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        short_circuit: bool,
    }

    #[async_trait]
    impl Interceptor for Tracer {
        async fn intercept(&self, request: &RequestDescriptor, next: Next) -> Result<ResponseDescriptor> {
            self.log.lock().unwrap().push(format!("in {}", self.name));
            let response = if self.short_circuit {
                ResponseDescriptor::from_bytes(ResponseHead::new(203, "Synth", ParamContainer::new()), "synth")
            } else {
                next.run(request).await?
            };
            self.log.lock().unwrap().push(format!("out {}", self.name));
            Ok(response)
        }
    }

    fn chain(short_at: Option<usize>, transport: Arc<CountingTransport>) -> (ExecutionChain, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptors = ["a", "b", "c"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                Arc::new(Tracer {
                    name,
                    log: log.clone(),
                    short_circuit: short_at == Some(i),
                }) as Arc<dyn Interceptor>
            })
            .collect();
        (ExecutionChain::new(interceptors, transport), log)
    }

    fn request() -> RequestDescriptor {
        RequestBuilder::new(Method::Get, "/").build().unwrap()
    }

    #[tokio::test]
    async fn runs_in_order_and_unwinds_in_reverse() {
        let transport = Arc::new(CountingTransport::default());
        let (chain, log) = chain(None, transport.clone());
        let response = chain.execute(&request()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock().unwrap(), ["in a", "in b", "in c", "out c", "out b", "out a"]);
    }

    #[tokio::test]
    async fn short_circuit_stops_the_rest() {
        let transport = Arc::new(CountingTransport::default());
        let (chain, log) = chain(Some(1), transport.clone());
        let response = chain.execute(&request()).await.unwrap();
        assert_eq!(response.status(), 203);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap(), ["in a", "in b", "out b", "out a"]);
    }

    #[tokio::test]
    async fn empty_chain_calls_transport_directly() {
        let transport = Arc::new(CountingTransport::default());
        let chain = ExecutionChain::new(Vec::new(), transport.clone());
        assert!(chain.is_empty());
        chain.execute(&request()).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
