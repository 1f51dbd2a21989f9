//! Multi-backend HTTP client library.
//!
//! Requests are immutable descriptors built fluently from a [`Sender`],
//! serialized by a [`ContentNegotiator`], passed through an
//! [`ExecutionChain`] of interceptors and executed by a pluggable
//! [`Transport`] (hyper or reqwest).

// Request model
pub mod media_type;
pub mod params;
pub mod request;
pub mod response;

// Pipeline
pub mod chain;
pub mod negotiation;
pub mod sender;
pub mod transport;

// Interceptors
pub mod cache;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use chain::{ExecutionChain, Interceptor, Next};
pub use config::{load_config, ClientConfig};
pub use error::{Error, Result};
pub use negotiation::ContentNegotiator;
pub use params::ParamContainer;
pub use request::{Body, Method, RequestBuilder, RequestDescriptor};
pub use response::{ResponseDescriptor, ResponseHead};
pub use sender::{Extracted, ResponseExtractor, ResponseHandler, Sender, SenderBuilder};
pub use transport::{CallHandle, HyperTransport, ReqwestTransport, Transport, TransportCallback};
