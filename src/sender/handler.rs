//! Caller-side hooks for consuming responses.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::negotiation::ContentNegotiator;
use crate::request::RequestDescriptor;
use crate::response::{ResponseDescriptor, ResponseHead};

/// Receives the outcome of `Sender::execute_with`.
///
/// The response is closed after `on_success` returns. An error returned from
/// `on_success` is reported back through `on_failure`.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn on_success(&self, request: &RequestDescriptor, response: &mut ResponseDescriptor) -> Result<()>;

    async fn on_failure(&self, request: &RequestDescriptor, error: &Error);
}

/// Turns a response into a caller-defined value.
#[async_trait]
pub trait ResponseExtractor: Send + Sync {
    type Output: Send;

    async fn extract(&self, request: &RequestDescriptor, response: &mut ResponseDescriptor) -> Result<Self::Output>;
}

/// A typed value together with the head of the response it came from.
#[derive(Debug, Clone)]
pub struct Extracted<T> {
    pub head: ResponseHead,
    pub value: T,
}

impl<T> Extracted<T> {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Read the body and deserialize it through the negotiator.
///
/// A status of 300 or above nobody registered an unmarshaller for is a
/// `Status` error; every other miss is a `Processing` error.
pub(crate) async fn extract_typed<T: DeserializeOwned>(
    negotiator: &ContentNegotiator,
    response: &mut ResponseDescriptor,
) -> Result<Extracted<T>> {
    let head = response.head().clone();
    if head.status >= 300 && !negotiator.can_unmarshall(&head) {
        return Err(Error::Status { head: Box::new(head) });
    }

    let bytes = response.bytes().await?;
    let value = negotiator.deserialize(&head, &bytes)?;
    let value = serde_json::from_value(value)
        .map_err(|e| Error::processing_with(format!("cannot convert payload: {e}"), &head))?;
    Ok(Extracted { head, value })
}
