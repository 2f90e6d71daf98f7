// src/connection/handler.rs

//! Defines the `ConnectionHandler`, the task that owns the physical WebSocket.
//!
//! The handler multiplexes two sources in one loop: outbound commands queued by
//! `Connection` handles, and inbound frames from the socket. Inbound text frames
//! are fanned out to every registered listener in the order the transport
//! delivered them. When the socket closes, for any reason, the handler records
//! the close reason and delivers a final `Closed` event to every listener.

use super::registry::Shared;
use crate::core::metrics;
use crate::core::protocol::CloseReason;
use crate::core::protocol::close::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

// Upper bound on flushing the close handshake once the loop has exited.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

// Reported when the peer sends a close frame without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// A command queued by a `Connection` handle for the driver.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Close(CloseReason),
}

/// Drives a single WebSocket until it closes.
pub(crate) struct ConnectionHandler<S> {
    ws: WebSocketStream<S>,
    outbound_rx: UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        ws: WebSocketStream<S>,
        outbound_rx: UnboundedReceiver<Outbound>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            ws,
            outbound_rx,
            shared,
        }
    }

    /// The main event loop for the connection.
    pub(crate) async fn run(self) {
        let Self {
            ws,
            mut outbound_rx,
            shared,
        } = self;
        let (mut sink, mut stream) = ws.split();

        let reason = 'main_loop: loop {
            tokio::select! {
                // Locally requested closes and writes take priority over reads.
                biased;

                command = outbound_rx.recv() => {
                    match command {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                warn!("Connection {}: failed to send frame: {e}", shared.label);
                                break 'main_loop CloseReason::Other(CLOSE_ABNORMAL);
                            }
                        }
                        Some(Outbound::Close(reason)) => {
                            info!(
                                "Connection {}: closing with code {} ({reason}).",
                                shared.label,
                                reason.code()
                            );
                            let frame = CloseFrame {
                                code: CloseCode::from(reason.code()),
                                reason: Cow::Borrowed(""),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            break 'main_loop reason;
                        }
                        None => {
                            // Every handle was dropped; nobody can use the socket anymore.
                            debug!("Connection {}: all handles dropped.", shared.label);
                            let frame = CloseFrame {
                                code: CloseCode::from(CLOSE_NORMAL),
                                reason: Cow::Borrowed(""),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            break 'main_loop CloseReason::Normal;
                        }
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            debug!("Connection {}: received frame: {}", shared.label, text);
                            shared.dispatch(Arc::from(text));
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => shared.dispatch(Arc::from(text)),
                            Err(_) => debug!(
                                "Connection {}: dropping non-UTF-8 binary frame.",
                                shared.label
                            ),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame
                                .map(|f| u16::from(f.code))
                                .unwrap_or(CLOSE_NO_STATUS);
                            info!("Connection {}: closed by peer with code {code}.", shared.label);
                            break 'main_loop CloseReason::from(code);
                        }
                        // Ping/pong are answered by tungstenite itself.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Connection {}: transport error: {e}", shared.label);
                            break 'main_loop CloseReason::Other(CLOSE_ABNORMAL);
                        }
                        None => {
                            warn!("Connection {}: stream ended without a close frame.", shared.label);
                            break 'main_loop CloseReason::Other(CLOSE_ABNORMAL);
                        }
                    }
                }
            }
        };

        // Flush any pending close reply; the peer may already be gone.
        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.close()).await;

        metrics::OPEN_CONNECTIONS.dec();
        shared.finish(reason);
    }
}
