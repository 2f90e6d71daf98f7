// src/core/client.rs

//! Defines `CfeClient`, the transport client that owns one CFE connection and
//! allocates correlation ids for the requests sent over it.

use crate::connection::Connection;
use crate::core::BifrostError;
use crate::core::engine::{CALIBRATE, CORRECT, FORMULATE, PREDICT};
use crate::core::operation::{DEFAULT_IDLE_TIMEOUT, Handlers, Operation, OperationStream};
use crate::core::protocol::CloseReason;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Per-client tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Silence after which an operation closes the connection.
    pub idle_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// A client bound to exactly one connection. It never reconnects on its own;
/// that is the pool's job.
#[derive(Debug)]
pub struct CfeClient {
    connection: Arc<Connection>,
    /// The next correlation id. Starts at 0, one per `send`.
    next_request_id: AtomicU64,
    options: ClientOptions,
}

impl CfeClient {
    pub fn new(connection: Arc<Connection>, options: ClientOptions) -> Self {
        Self {
            connection,
            next_request_id: AtomicU64::new(0),
            options,
        }
    }

    fn allocate_request_id(&self) -> String {
        self.next_request_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string()
    }

    /// Sends `command` with `payload` and returns the stream of its events.
    /// Failures, including an unserializable payload, arrive on the stream.
    pub fn send<T>(&self, command: &str, payload: &T) -> OperationStream
    where
        T: Serialize + ?Sized,
    {
        let request_id = self.allocate_request_id();
        match serde_json::to_value(payload) {
            Ok(payload) => Operation::start(
                request_id,
                command,
                payload,
                self.connection.clone(),
                self.options.idle_timeout,
            ),
            Err(e) => {
                OperationStream::failed(request_id, BifrostError::InvalidRequest(e.to_string()))
            }
        }
    }

    /// Like `send`, but dispatches the events to `handlers` from a spawned task.
    pub fn send_with_handlers<T>(
        &self,
        command: &str,
        payload: &T,
        handlers: Handlers,
    ) -> JoinHandle<()>
    where
        T: Serialize + ?Sized,
    {
        let stream = self.send(command, payload);
        tokio::spawn(handlers.drive(stream))
    }

    pub fn formulate<T: Serialize + ?Sized>(&self, payload: &T) -> OperationStream {
        self.send(FORMULATE, payload)
    }

    pub fn correct<T: Serialize + ?Sized>(&self, payload: &T) -> OperationStream {
        self.send(CORRECT, payload)
    }

    pub fn predict<T: Serialize + ?Sized>(&self, payload: &T) -> OperationStream {
        self.send(PREDICT, payload)
    }

    pub fn calibrate<T: Serialize + ?Sized>(&self, payload: &T) -> OperationStream {
        self.send(CALIBRATE, payload)
    }

    /// Closes the connection. Operations still listening on it receive a
    /// disconnect error.
    pub fn close(&self) {
        self.connection.close(CloseReason::Normal);
    }

    /// True if the connection is open right now.
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}
