// src/connection/registry.rs

//! The listener registry shared between a `Connection` and its socket driver.

use crate::core::protocol::CloseReason;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use strum_macros::Display;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// An event observed on a connection, fanned out to every registered listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A raw text frame, not yet decoded.
    Message(Arc<str>),
    /// The connection closed. Always the last event a listener receives.
    Closed(CloseReason),
}

/// The lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum ReadyState {
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for ReadyState {
    fn from(value: u8) -> Self {
        match value {
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

#[derive(Debug, Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, UnboundedSender<ConnectionEvent>>,
    /// Set once, when the driver observes the close.
    closed: Option<CloseReason>,
}

/// State shared by the connection handle, its driver task and listener guards.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) label: String,
    state: AtomicU8,
    listeners: Mutex<Listeners>,
}

impl Shared {
    pub(crate) fn new(label: String) -> Self {
        Self {
            label,
            state: AtomicU8::new(ReadyState::Open as u8),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.state.load(Ordering::Acquire))
    }

    /// Moves the connection from `Open` to `Closing`. Returns false if it was
    /// already closing or closed, so only the first close request wins.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ReadyState::Open as u8,
                ReadyState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Registers a new listener. A listener added after the close immediately
    /// receives the recorded `Closed` event.
    pub(crate) fn register(&self, tx: UnboundedSender<ConnectionEvent>) -> Option<u64> {
        let mut listeners = self.listeners.lock();
        if let Some(reason) = listeners.closed {
            let _ = tx.send(ConnectionEvent::Closed(reason));
            return None;
        }
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.senders.insert(id, tx);
        Some(id)
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.listeners.lock().senders.remove(&id);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().senders.len()
    }

    /// Delivers a frame to every listener, pruning listeners whose receiver is gone.
    pub(crate) fn dispatch(&self, text: Arc<str>) {
        let mut listeners = self.listeners.lock();
        listeners
            .senders
            .retain(|_, tx| tx.send(ConnectionEvent::Message(text.clone())).is_ok());
    }

    /// Records the close, notifies every listener and drops them all.
    pub(crate) fn finish(&self, reason: CloseReason) {
        self.state.store(ReadyState::Closed as u8, Ordering::Release);
        let mut listeners = self.listeners.lock();
        listeners.closed = Some(reason);
        let count = listeners.senders.len();
        for (_, tx) in listeners.senders.drain() {
            let _ = tx.send(ConnectionEvent::Closed(reason));
        }
        debug!(
            "Connection {} closed ({reason}, code {}), notified {count} listener(s).",
            self.label,
            reason.code()
        );
    }
}
