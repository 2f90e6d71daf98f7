// src/core/operation/stream.rs

//! The caller's side of an operation: a stream of events that ends after
//! exactly one terminal event.

use crate::core::BifrostError;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One notification from an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    /// Completion ratio in `0..=1`.
    Progress(f64),
    IntermediateResult(Value),
    /// Terminal.
    Result(Value),
    /// Terminal.
    Error(BifrostError),
}

impl OperationEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationEvent::Result(_) | OperationEvent::Error(_))
    }
}

/// The events of one operation. Yields zero or more `Progress` and
/// `IntermediateResult` events followed by exactly one `Result` or `Error`,
/// then ends.
///
/// Dropping the stream abandons the operation; it detaches from the connection
/// the next time it is woken.
#[derive(Debug)]
pub struct OperationStream {
    request_id: String,
    inner: UnboundedReceiverStream<OperationEvent>,
    finished: bool,
}

impl OperationStream {
    pub(crate) fn new(request_id: String, rx: UnboundedReceiver<OperationEvent>) -> Self {
        Self {
            request_id,
            inner: UnboundedReceiverStream::new(rx),
            finished: false,
        }
    }

    /// A stream that yields `error` and ends, for operations that failed before
    /// anything was sent.
    pub(crate) fn failed(request_id: String, error: BifrostError) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let _ = tx.send(OperationEvent::Error(error));
        Self::new(request_id, rx)
    }

    /// The correlation id allocated to this operation.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<OperationEvent> {
        StreamExt::next(self).await
    }

    /// Drives the operation to completion, passing every non-terminal event to
    /// `on_event`, and returns the final result payload or the error.
    pub async fn into_result<F>(mut self, mut on_event: F) -> Result<Value, BifrostError>
    where
        F: FnMut(&OperationEvent),
    {
        while let Some(event) = self.next_event().await {
            match event {
                OperationEvent::Result(payload) => return Ok(payload),
                OperationEvent::Error(e) => return Err(e),
                other => on_event(&other),
            }
        }
        Err(BifrostError::Internal(format!(
            "operation {} ended without a result",
            self.request_id
        )))
    }

    /// Waits for the final result, ignoring progress.
    pub async fn wait(self) -> Result<Value, BifrostError> {
        self.into_result(|_| {}).await
    }
}

impl Stream for OperationStream {
    type Item = OperationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
