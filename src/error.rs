//! Crate-wide error taxonomy.
//!
//! # Classes
//! ```text
//! Connect / ReadTimeout / RequestWrite / ResponseRead  ← normalized transport failures
//! RequestBuild / InvalidArgument                       ← fail before any I/O
//! Processing                                           ← marshal/unmarshal, no handler
//! Status                                               ← status >= 300 with no unmarshaller
//! Config                                               ← configuration load/validation
//! ```
//!
//! # Design Decisions
//! - Transport failures arrive already normalized (see `transport::TransportError`)
//! - The core never retries; a retry is an interceptor's decision
//! - Errors raised after a response arrived carry its head, never its body

use thiserror::Error;

use crate::config::ConfigError;
use crate::response::ResponseHead;
use crate::transport::TransportError;

/// Errors surfaced by the request pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection refused, DNS failure or connect timeout.
    #[error("connect failed: {0}")]
    Connect(String),

    /// No data arrived within the read timeout.
    #[error("read timed out: {0}")]
    ReadTimeout(String),

    /// The request could not be written to the peer.
    #[error("request write failed: {0}")]
    RequestWrite(String),

    /// The response could not be read from the peer.
    #[error("response read failed: {0}")]
    ResponseRead(String),

    /// The request descriptor is invalid (method, path, params, content type).
    #[error("invalid request: {0}")]
    RequestBuild(String),

    /// A blank or otherwise unusable argument was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization or deserialization of a body failed.
    #[error("processing failed: {message}")]
    Processing {
        message: String,
        head: Option<Box<ResponseHead>>,
    },

    /// A response status nobody registered an unmarshaller for.
    #[error("unexpected status {} {}", .head.status, .head.message)]
    Status { head: Box<ResponseHead> },

    /// A spawned call was canceled before it completed.
    #[error("call canceled")]
    Canceled,

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a processing error without a response.
    pub fn processing(message: impl Into<String>) -> Self {
        Error::Processing {
            message: message.into(),
            head: None,
        }
    }

    /// Build a processing error that carries the response head.
    pub fn processing_with(message: impl Into<String>, head: &ResponseHead) -> Self {
        Error::Processing {
            message: message.into(),
            head: Some(Box::new(head.clone())),
        }
    }

    /// The response head attached to this error, if any.
    pub fn head(&self) -> Option<&ResponseHead> {
        match self {
            Error::Processing { head, .. } => head.as_deref(),
            Error::Status { head } => Some(head),
            _ => None,
        }
    }

    /// Short label used in metrics and logs.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Connect(_) => "connect",
            Error::ReadTimeout(_) => "read_timeout",
            Error::RequestWrite(_) => "request_write",
            Error::ResponseRead(_) => "response_read",
            Error::RequestBuild(_) => "request_build",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Processing { .. } => "processing",
            Error::Status { .. } => "status",
            Error::Canceled => "canceled",
            Error::Config(_) => "config",
        }
    }

    /// True for the connect-phase class.
    pub fn is_connect(&self) -> bool {
        matches!(self, Error::Connect(_))
    }

    /// True when a read timeout expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ReadTimeout(_))
    }

    /// True for errors raised before any network access.
    pub fn is_build(&self) -> bool {
        matches!(self, Error::RequestBuild(_) | Error::InvalidArgument(_))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(message) => Error::Connect(message),
            TransportError::RequestWrite(message) => Error::RequestWrite(message),
            TransportError::ResponseRead {
                message,
                timed_out: true,
            } => Error::ReadTimeout(message),
            TransportError::ResponseRead { message, .. } => Error::ResponseRead(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamContainer;
    use std::time::Duration;

    #[test]
    fn transport_errors_keep_their_class() {
        assert!(Error::from(TransportError::Connect("refused".into())).is_connect());
        assert!(Error::from(TransportError::read_timeout(Duration::from_secs(2))).is_timeout());
        assert!(matches!(
            Error::from(TransportError::RequestWrite("broken pipe".into())),
            Error::RequestWrite(_)
        ));
        assert!(matches!(
            Error::from(TransportError::read_failed("reset")),
            Error::ResponseRead(_)
        ));
    }

    #[test]
    fn status_error_displays_status_line() {
        let head = ResponseHead::new(404, "Not Found", ParamContainer::new());
        let err = Error::Status {
            head: Box::new(head),
        };
        assert_eq!(err.to_string(), "unexpected status 404 Not Found");
        assert_eq!(err.head().map(|h| h.status), Some(404));
    }
}
