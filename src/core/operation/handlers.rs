// src/core/operation/handlers.rs

//! Callback-style consumption of an operation, for callers that prefer
//! `progress` / `error` / `results` handlers over polling a stream.

use super::stream::{OperationEvent, OperationStream};
use crate::core::BifrostError;
use serde_json::Value;

pub type ProgressHandler = Box<dyn FnMut(f64) + Send>;
pub type ResultsHandler = Box<dyn FnMut(Value) + Send>;
pub type ErrorHandler = Box<dyn FnMut(BifrostError) + Send>;

/// A set of optional callbacks. Any of them may be omitted; events without a
/// handler are dropped, errors included.
#[derive(Default)]
pub struct Handlers {
    pub progress: Option<ProgressHandler>,
    pub error: Option<ErrorHandler>,
    pub results: Option<ResultsHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(BifrostError) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Receives both intermediate results and the final result.
    pub fn on_results(mut self, f: impl FnMut(Value) + Send + 'static) -> Self {
        self.results = Some(Box::new(f));
        self
    }

    /// Dispatches every event of `stream` to the matching handler until the
    /// stream ends.
    pub async fn drive(mut self, mut stream: OperationStream) {
        while let Some(event) = stream.next_event().await {
            match event {
                OperationEvent::Progress(value) => {
                    if let Some(f) = self.progress.as_mut() {
                        f(value);
                    }
                }
                OperationEvent::IntermediateResult(payload) | OperationEvent::Result(payload) => {
                    if let Some(f) = self.results.as_mut() {
                        f(payload);
                    }
                }
                OperationEvent::Error(e) => {
                    if let Some(f) = self.error.as_mut() {
                        f(e);
                    }
                }
            }
        }
    }
}
