// src/connection/mod.rs

//! Manages the lifecycle of a single CFE WebSocket connection: opening it,
//! fanning inbound frames out to listeners, and closing it with a reason code.
//!
//! A `Connection` is shared by every operation multiplexed on it. Any holder of
//! the handle can close it, which terminates all in-flight operations on it.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handler;
mod registry;

// Publicly re-export the primary types from the sub-modules.
pub use guard::{Listener, ListenerGuard};
pub use registry::{ConnectionEvent, ReadyState};

use self::handler::{ConnectionHandler, Outbound};
use self::registry::Shared;
use crate::core::BifrostError;
use crate::core::metrics;
use crate::core::protocol::CloseReason;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

/// A handle to one open WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
    outbound: UnboundedSender<Outbound>,
}

impl Connection {
    /// Opens a WebSocket to `url` and waits until the handshake has completed.
    /// Fails if the connection closes or errors before reaching the open state.
    pub async fn connect(
        url: &Url,
        label: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>, BifrostError> {
        let label = label.into();
        debug!("Connection {label}: connecting to {}", url.host_str().unwrap_or("?"));
        let (ws, _response) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                BifrostError::Connection(format!(
                    "timed out after {connect_timeout:?} while connecting"
                ))
            })??;
        Ok(Self::from_stream(ws, label))
    }

    /// Wraps an already-open WebSocket and spawns its driver task.
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S>(ws: WebSocketStream<S>, label: impl Into<String>) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared::new(label.into()));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        metrics::CONNECTIONS_OPENED_TOTAL.inc();
        metrics::OPEN_CONNECTIONS.inc();
        info!("Connection {} is open.", shared.label);

        let handler = ConnectionHandler::new(ws, outbound_rx, shared.clone());
        tokio::spawn(handler.run());

        Arc::new(Self { shared, outbound })
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// The current state, queried at call time.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Subscribes to every frame and to the close event of this connection.
    pub fn subscribe(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.register(tx);
        Listener::new(rx, self.shared.clone(), id)
    }

    /// The number of listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.shared.listener_count()
    }

    /// Queues a text frame for transmission.
    pub fn send_text(&self, text: String) -> Result<(), BifrostError> {
        if !self.is_open() {
            return Err(BifrostError::Connection(format!(
                "connection {} is not open",
                self.shared.label
            )));
        }
        self.outbound.send(Outbound::Text(text)).map_err(|_| {
            BifrostError::Connection(format!("connection {} is closed", self.shared.label))
        })
    }

    /// Closes the connection with `reason` without waiting for confirmation.
    /// Only the first close request takes effect.
    pub fn close(&self, reason: CloseReason) {
        if self.shared.begin_close() {
            let _ = self.outbound.send(Outbound::Close(reason));
        }
    }
}
