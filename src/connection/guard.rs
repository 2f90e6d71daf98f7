// src/connection/guard.rs

//! Defines `Listener` and its RAII `ListenerGuard`, a subscription to the
//! events of one socket.

use super::registry::{ConnectionEvent, Shared};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// An RAII guard that detaches a listener from its connection when dropped.
/// Detaching is idempotent: a listener already pruned by the driver is simply absent.
#[derive(Debug)]
pub struct ListenerGuard {
    shared: Arc<Shared>,
    /// `None` when the listener was registered after the connection had closed.
    id: Option<u64>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.shared.unregister(id);
        }
    }
}

/// A subscription to every event observed on one connection.
#[derive(Debug)]
pub struct Listener {
    rx: UnboundedReceiver<ConnectionEvent>,
    _guard: ListenerGuard,
}

impl Listener {
    pub(crate) fn new(
        rx: UnboundedReceiver<ConnectionEvent>,
        shared: Arc<Shared>,
        id: Option<u64>,
    ) -> Self {
        Self {
            rx,
            _guard: ListenerGuard { shared, id },
        }
    }

    /// Waits for the next event. Returns `None` once the connection has closed
    /// and the `Closed` event has been consumed.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Detaches from the connection. Equivalent to dropping the listener.
    pub fn detach(self) {}
}
