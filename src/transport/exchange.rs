//! Phase-aware timing for a single request/response exchange.
//!
//! Connect failures come from the backend's connector. The read timer for
//! the response head starts only once the request body has been handed to
//! the connection; until then the exchange is bounded by a write budget.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use hyper::body::{Body, Frame, SizeHint};
use tokio::sync::Notify;

use crate::transport::TransportError;

/// Request body that signals once its last frame was taken.
#[derive(Debug)]
pub(crate) struct SignalingBody<B> {
    inner: B,
    written: Arc<Notify>,
}

impl<B> SignalingBody<B> {
    pub(crate) fn new(inner: B, written: Arc<Notify>) -> Self {
        Self { inner, written }
    }
}

impl<B> Body for SignalingBody<B>
where
    B: Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if !matches!(frame, Some(Ok(_))) {
            this.written.notify_one();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        let end = self.inner.is_end_stream();
        if end {
            self.written.notify_one();
        }
        end
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Drive `exchange` until the response head arrives.
///
/// Expiry before the body was written is a `RequestWrite` failure; expiry
/// afterwards is a read timeout.
pub(crate) async fn await_head<F, T>(
    exchange: F,
    written: &Notify,
    write_budget: Duration,
    read_timeout: Duration,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    let deadline = async {
        if tokio::time::timeout(write_budget, written.notified()).await.is_err() {
            return TransportError::RequestWrite(format!("request not written within {write_budget:?}"));
        }
        tokio::time::sleep(read_timeout).await;
        TransportError::read_timeout(read_timeout)
    };

    tokio::select! {
        biased;
        result = exchange => result,
        err = deadline => Err(err),
    }
}
