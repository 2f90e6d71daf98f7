// src/core/pool.rs

//! Defines `CfeClientManager`, the connection pool that keeps one client per
//! engine type.
//!
//! Connections are created lazily on the first `get` for an engine type and are
//! authenticated by a session token carried in the connection URL. Each pooled
//! connection gets a watcher task that:
//! - force-closes the connection with the unauthorized code when the CFE pushes
//!   a not-authorized error, so in-flight operations and eviction see a normal close;
//! - evicts the pool entry once the connection has closed, so the next `get`
//!   opens a fresh one.
//!
//! Creation is serialized per engine type: concurrent `get` calls for an engine
//! that is not yet connected share a single connection attempt.

use crate::config::Config;
use crate::connection::{Connection, ConnectionEvent, Listener};
use crate::core::BifrostError;
use crate::core::client::{CfeClient, ClientOptions};
use crate::core::engine::EngineType;
use crate::core::metrics;
use crate::core::protocol::{CloseReason, decode};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Query parameter carrying the session token.
pub const TOKEN_PARAM: &str = "xr-token";
/// Query parameter carrying the engine type.
pub const ENGINE_PARAM: &str = "engineType";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The pool entry for one engine type. The async mutex is held for the whole
/// connection attempt, which makes creation single-flight.
type Slot = Arc<Mutex<Option<Arc<CfeClient>>>>;

/// Invoked once, with the new client, when `get` had to open a connection.
pub type NewConnectionCallback = Box<dyn FnOnce(&Arc<CfeClient>) + Send>;

/// Options for a single `get` call.
#[derive(Default)]
pub struct GetOptions {
    pub on_new_connection: Option<NewConnectionCallback>,
}

impl GetOptions {
    pub fn on_new_connection(f: impl FnOnce(&Arc<CfeClient>) + Send + 'static) -> Self {
        Self {
            on_new_connection: Some(Box::new(f)),
        }
    }
}

/// Caches one `CfeClient` per engine type.
#[derive(Debug)]
pub struct CfeClientManager {
    endpoint: Url,
    token: String,
    connect_timeout: Duration,
    options: ClientOptions,
    slots: DashMap<EngineType, Slot>,
}

impl CfeClientManager {
    pub fn new(endpoint: Url, token: impl Into<String>) -> Self {
        Self {
            endpoint,
            token: token.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            options: ClientOptions::default(),
            slots: DashMap::new(),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds a manager from the resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.endpoint.clone(), config.token.clone())
            .with_connect_timeout(config.connect_timeout)
            .with_client_options(ClientOptions {
                idle_timeout: config.idle_timeout,
            })
    }

    /// The URL used to connect `engine_type`, token included.
    pub fn connection_url(&self, engine_type: EngineType) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(TOKEN_PARAM, &self.token)
            .append_pair(ENGINE_PARAM, engine_type.as_ref());
        url
    }

    /// Returns the cached, open client for `engine_type`, or opens, caches and
    /// returns a new one. `options.on_new_connection` runs only in the latter case.
    pub async fn get(
        &self,
        engine_type: EngineType,
        options: GetOptions,
    ) -> Result<Arc<CfeClient>, BifrostError> {
        let slot = self.slots.entry(engine_type).or_default().clone();
        let mut entry = slot.lock().await;

        if let Some(client) = entry.as_ref()
            && client.is_open()
        {
            return Ok(client.clone());
        }

        info!("Opening a new CFE connection for engine '{engine_type}'.");
        let url = self.connection_url(engine_type);
        let connection =
            Connection::connect(&url, engine_type.to_string(), self.connect_timeout).await?;
        let listener = connection.subscribe();
        let client = Arc::new(CfeClient::new(connection.clone(), self.options));

        tokio::spawn(watch_connection(
            engine_type,
            listener,
            Arc::downgrade(&connection),
            slot.clone(),
        ));

        *entry = Some(client.clone());
        drop(entry);

        if let Some(on_new_connection) = options.on_new_connection {
            on_new_connection(&client);
        }
        Ok(client)
    }

    /// The cached client for `engine_type`, open or not.
    pub async fn cached(&self, engine_type: EngineType) -> Option<Arc<CfeClient>> {
        let slot = self.slots.get(&engine_type)?.value().clone();
        let entry = slot.lock().await;
        entry.as_ref().cloned()
    }

    /// Closes every cached client. Does not wait for the closes to complete.
    pub async fn close_all(&self) {
        let slots: Vec<(EngineType, Slot)> = self
            .slots
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (engine_type, slot) in slots {
            if let Some(client) = slot.lock().await.as_ref() {
                debug!("Closing CFE connection for engine '{engine_type}'.");
                client.close();
            }
        }
    }
}

/// Watches one pooled connection for unauthorized pushes and for its close.
async fn watch_connection(
    engine_type: EngineType,
    mut listener: Listener,
    connection: Weak<Connection>,
    slot: Slot,
) {
    while let Some(event) = listener.recv().await {
        match event {
            ConnectionEvent::Message(text) => {
                let unauthorized = decode(&text).is_ok_and(|message| message.is_unauthorized());
                if unauthorized && let Some(connection) = connection.upgrade() {
                    warn!("CFE rejected the session for engine '{engine_type}', closing connection.");
                    metrics::UNAUTHORIZED_CLOSES_TOTAL.inc();
                    connection.close(CloseReason::Unauthorized);
                }
            }
            ConnectionEvent::Closed(reason) => {
                let mut entry = slot.lock().await;
                let is_current = entry
                    .as_ref()
                    .is_some_and(|client| Arc::as_ptr(client.connection()) == connection.as_ptr());
                if is_current {
                    *entry = None;
                    info!(
                        "Evicted CFE connection for engine '{engine_type}' (closed with code {}).",
                        reason.code()
                    );
                }
                break;
            }
        }
    }
}
