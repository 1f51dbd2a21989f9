//! Callback-driven delivery of a call.
//!
//! # Event order
//! ```text
//! on_request_completed | on_request_failure
//!   → on_response_status
//!   → on_response_headers
//!   → on_response_payload | on_response_payload_failure | on_response_failure
//! ```

use bytes::Bytes;

use crate::error::Error;
use crate::params::ParamContainer;
use crate::response::ResponseDescriptor;

/// Receives the progress of a call. Every method defaults to a no-op.
pub trait TransportCallback: Send + Sync {
    /// The request was fully written.
    fn on_request_completed(&self) {}

    /// The request never completed: connect failure, write failure or an
    /// error raised before any response.
    fn on_request_failure(&self, _error: &Error) {}

    fn on_response_status(&self, _status: u16, _message: &str) {}

    fn on_response_headers(&self, _headers: &ParamContainer) {}

    /// The whole decoded body.
    fn on_response_payload(&self, _payload: Bytes) {}

    /// The body arrived but could not be decoded.
    fn on_response_payload_failure(&self, _error: &Error) {}

    /// Reading the response failed after the request completed.
    fn on_response_failure(&self, _error: &Error) {}
}

/// Fire every applicable callback event for `outcome`, in order.
pub async fn deliver(outcome: Result<ResponseDescriptor, Error>, callback: &dyn TransportCallback) {
    let mut response = match outcome {
        Ok(response) => response,
        Err(err @ (Error::ResponseRead(_) | Error::ReadTimeout(_))) => {
            callback.on_request_completed();
            callback.on_response_failure(&err);
            return;
        }
        Err(err) => {
            callback.on_request_failure(&err);
            return;
        }
    };

    callback.on_request_completed();
    callback.on_response_status(response.status(), response.message());
    callback.on_response_headers(response.headers());

    match response.bytes().await {
        Ok(payload) => callback.on_response_payload(payload),
        Err(err @ Error::Processing { .. }) => callback.on_response_payload_failure(&err),
        Err(err) => callback.on_response_failure(&err),
    }
    response.close();
}
