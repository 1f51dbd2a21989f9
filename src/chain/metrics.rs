//! Request counters and latency histograms.

use std::time::Instant;

use async_trait::async_trait;

use crate::chain::{Interceptor, Next};
use crate::error::Result;
use crate::observability::metrics::record_request;
use crate::request::RequestDescriptor;
use crate::response::ResponseDescriptor;

/// Records `relay_requests_total` and `relay_request_duration_seconds` for
/// everything below it in the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsInterceptor;

#[async_trait]
impl Interceptor for MetricsInterceptor {
    async fn intercept(&self, request: &RequestDescriptor, next: Next) -> Result<ResponseDescriptor> {
        let start = Instant::now();
        let outcome = next.run(request).await;
        let status = match &outcome {
            Ok(response) => response.status().to_string(),
            Err(err) => err.class().to_string(),
        };
        record_request(request.method().as_str(), &status, start);
        tracing::debug!(
            method = %request.method(),
            path = %request.path_query(),
            status = %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request finished"
        );
        outcome
    }
}
