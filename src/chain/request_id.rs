//! Request correlation IDs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::chain::{Interceptor, Next};
use crate::error::Result;
use crate::request::RequestDescriptor;
use crate::response::ResponseDescriptor;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Stamps `x-request-id` with a UUID v4 on requests that carry none.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdInterceptor;

#[async_trait]
impl Interceptor for RequestIdInterceptor {
    async fn intercept(&self, request: &RequestDescriptor, next: Next) -> Result<ResponseDescriptor> {
        if let Some(existing) = request.header(X_REQUEST_ID) {
            tracing::debug!(request_id = %existing, "Request ID already present");
            return next.run(request).await;
        }
        let request_id = Uuid::new_v4().to_string();
        tracing::debug!(request_id = %request_id, path = %request.path_query(), "Request ID assigned");
        let stamped = request.with_header(X_REQUEST_ID, request_id)?;
        next.run(&stamped).await
    }
}
