// src/core/operation/mod.rs

//! The operation correlator: the lifecycle of one request/response exchange on
//! a shared, multiplexed connection.
//!
//! An operation registers a listener on the connection, transmits its request,
//! and then routes every inbound frame carrying its correlation id to the caller.
//! Progress and intermediate results may arrive any number of times; a final
//! result or an error ends the operation. An idle timer, restarted by every
//! progress or intermediate frame, closes the whole connection with the timeout
//! code when it expires. That close, like any other close, is mapped to exactly
//! one error for every operation still listening on the connection.

mod handlers;
mod stream;

pub use handlers::{ErrorHandler, Handlers, ProgressHandler, ResultsHandler};
pub use stream::{OperationEvent, OperationStream};

use crate::connection::{Connection, ConnectionEvent, Listener};
use crate::core::BifrostError;
use crate::core::metrics;
use crate::core::protocol::close::CLOSE_ABNORMAL;
use crate::core::protocol::{CloseReason, InboundMessage, OutboundRequest, decode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, warn};

/// The default idle timeout: 15 minutes and 30 seconds without any traffic.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60 + 30);

/// The progress value reported together with a final result.
pub const PROGRESS_COMPLETE: f64 = 1.0;

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// The request was sent; nothing has arrived yet.
    Pending,
    /// At least one progress or intermediate result arrived.
    Active,
    /// A final result or an error was delivered.
    Terminal,
}

/// What the run loop does after handling one frame.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Ignore,
    ResetTimer,
    Terminal,
}

/// One outstanding request on a connection.
pub struct Operation {
    request_id: String,
    connection: Arc<Connection>,
    idle_timeout: Duration,
    events: UnboundedSender<OperationEvent>,
    state: OperationState,
    final_result_arrived: bool,
}

impl Operation {
    /// Sends `{command, requestId, payload}` over `connection` and starts tracking
    /// the reply. Never fails synchronously: every failure is delivered through
    /// the returned stream as an `OperationEvent::Error`.
    ///
    /// `request_id` must be unique among the operations listening on `connection`.
    pub fn start(
        request_id: impl Into<String>,
        command: &str,
        payload: Value,
        connection: Arc<Connection>,
        idle_timeout: Duration,
    ) -> OperationStream {
        let request_id = request_id.into();
        let (events, rx) = mpsc::unbounded_channel();
        metrics::OPERATIONS_STARTED_TOTAL.inc();

        // The listener is attached before the request leaves so no reply can be missed.
        let listener = connection.subscribe();

        let request = OutboundRequest::new(command, request_id.clone(), payload);
        match request.encode() {
            Ok(text) => {
                // A failed send means the connection is closing; the listener
                // will observe the close and report it.
                if let Err(e) = connection.send_text(text) {
                    debug!("Operation {request_id}: request not sent: {e}");
                }
            }
            Err(e) => {
                metrics::OPERATIONS_FINISHED_TOTAL
                    .with_label_values(&["invalid_request"])
                    .inc();
                let _ = events.send(OperationEvent::Error(e));
                return OperationStream::new(request_id, rx);
            }
        }

        debug!(
            "Operation {request_id}: sent '{command}' on connection {}.",
            connection.label()
        );

        let operation = Operation {
            request_id: request_id.clone(),
            connection,
            idle_timeout,
            events,
            state: OperationState::Pending,
            final_result_arrived: false,
        };
        tokio::spawn(operation.run(listener));

        OperationStream::new(request_id, rx)
    }

    /// Listens until the operation becomes terminal, the connection closes, or
    /// the caller drops its stream. Dropping the listener on return detaches it.
    async fn run(mut self, mut listener: Listener) {
        let timer = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(timer);
        let mut timer_armed = true;

        loop {
            tokio::select! {
                event = listener.recv() => {
                    let step = match event {
                        Some(ConnectionEvent::Message(text)) => self.on_message(&text),
                        Some(ConnectionEvent::Closed(reason)) => self.on_close(reason),
                        None => self.on_close(CloseReason::Other(CLOSE_ABNORMAL)),
                    };
                    match step {
                        Step::Terminal => break,
                        Step::ResetTimer => {
                            timer.as_mut().reset(Instant::now() + self.idle_timeout);
                            timer_armed = true;
                        }
                        Step::Ignore => {}
                    }
                }
                _ = &mut timer, if timer_armed => {
                    timer_armed = false;
                    warn!(
                        "Operation {}: no traffic for {:?}, closing connection {}.",
                        self.request_id,
                        self.idle_timeout,
                        self.connection.label()
                    );
                    // The close comes back through the listener as a `Closed` event.
                    self.connection.close(CloseReason::Timeout);
                }
            }

            if self.events.is_closed() {
                debug!("Operation {}: caller went away, detaching.", self.request_id);
                break;
            }
        }
    }

    fn on_message(&mut self, text: &str) -> Step {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::DROPPED_FRAMES_TOTAL.inc();
                debug!("Operation {}: dropping frame: {e}", self.request_id);
                return Step::Ignore;
            }
        };

        if message.request_id() != self.request_id {
            return Step::Ignore;
        }

        match message {
            InboundMessage::Error { mut errors, .. } => {
                // Only the first entry is surfaced.
                let first = errors.swap_remove(0);
                self.finish(
                    "server_error",
                    OperationEvent::Error(BifrostError::ServerReported(first.message)),
                );
                Step::Terminal
            }
            InboundMessage::Progress { value, .. } => {
                if !self.final_result_arrived {
                    self.state = OperationState::Active;
                    self.emit(OperationEvent::Progress(value));
                }
                Step::ResetTimer
            }
            InboundMessage::IntermediateResult { payload, .. } => {
                self.state = OperationState::Active;
                self.emit(OperationEvent::IntermediateResult(payload));
                Step::ResetTimer
            }
            InboundMessage::Result { payload, .. } => {
                self.final_result_arrived = true;
                self.emit(OperationEvent::Progress(PROGRESS_COMPLETE));
                self.finish("result", OperationEvent::Result(payload));
                Step::Terminal
            }
        }
    }

    fn on_close(&mut self, reason: CloseReason) -> Step {
        if self.final_result_arrived {
            return Step::Terminal;
        }
        let (outcome, error) = match reason {
            CloseReason::Unauthorized => ("unauthorized", BifrostError::Unauthorized),
            CloseReason::Timeout => (
                "timeout",
                BifrostError::Timeout {
                    request_id: self.request_id.clone(),
                },
            ),
            _ => (
                "disconnected",
                BifrostError::Disconnected {
                    request_id: self.request_id.clone(),
                },
            ),
        };
        self.finish(outcome, OperationEvent::Error(error));
        Step::Terminal
    }

    fn emit(&self, event: OperationEvent) {
        let _ = self.events.send(event);
    }

    /// Delivers the terminal event. Called at most once per operation.
    fn finish(&mut self, outcome: &str, event: OperationEvent) {
        debug!(
            "Operation {}: {:?} -> terminal ({outcome}).",
            self.request_id, self.state
        );
        self.state = OperationState::Terminal;
        metrics::OPERATIONS_FINISHED_TOTAL
            .with_label_values(&[outcome])
            .inc();
        self.emit(event);
    }
}
