//! Connection registry: the key → [`Connection`] pool.
//!
//! # Contract
//!
//! - [`ConnectionRegistry::get_or_create`] runs in one critical section, so
//!   concurrent callers with equal keys always receive the *same* `Arc`.
//! - Connections are created lazily and never evicted.  `disconnect` and
//!   `reset` close the transport but keep the entry, so a later `connect`
//!   reuses it.
//! - [`ConnectionRegistry::open`] rejects reader indices above
//!   [`MAX_READER_INDEX`] before any backend is touched.
//!
//! # Extension points
//!
//! [`GatewayHooks`] lets an embedder install custom transports per key and
//! adjust the [`TransportConfig`] right before each connect (install applets,
//! choose an AID to auto-select, point at a relay).
//!
//! # Growth
//!
//! Every distinct simulated session token creates an entry that stays for the
//! life of the process.  Deployments that hand out many tokens should recycle
//! them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rcard_core::{ApduFixups, ConnectionKey, GatewayError, MAX_READER_INDEX};
use tracing::{debug, info};

use super::connection::Connection;
use super::transport::{SharedTransportFactory, Transport, TransportConfig};
use crate::domain::RelayEndpoint;

/// Embedder customization hooks.
pub trait GatewayHooks: Send + Sync {
    /// Custom transport for a new connection; `None` uses the default one.
    ///
    /// Called under the registry lock, so it must not block.
    fn create_transport(&self, _key: &ConnectionKey) -> Option<Box<dyn Transport>> {
        None
    }

    /// Adjusts the settings of a connect before it happens.
    fn configure(&self, _key: &ConnectionKey, _config: &mut TransportConfig) {}
}

/// Hooks that change nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl GatewayHooks for NoHooks {}

/// Gateway-wide defaults applied to every connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionDefaults {
    pub fixups: ApduFixups,
    pub reader_hint: Option<String>,
    pub relay: Option<RelayEndpoint>,
}

/// The key → connection pool.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionKey, Arc<Connection>>>,
    factory: SharedTransportFactory,
    hooks: Arc<dyn GatewayHooks>,
    defaults: ConnectionDefaults,
}

impl ConnectionRegistry {
    pub fn new(
        factory: SharedTransportFactory,
        hooks: Arc<dyn GatewayHooks>,
        defaults: ConnectionDefaults,
    ) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            factory,
            hooks,
            defaults,
        }
    }

    /// Returns the connection for `key`, creating it on first use.
    pub fn get_or_create(&self, key: &ConnectionKey) -> Arc<Connection> {
        let mut map = self.lock();
        if let Some(existing) = map.get(key) {
            return Arc::clone(existing);
        }

        let transport = self
            .hooks
            .create_transport(key)
            .unwrap_or_else(|| self.factory.create(key.card_type()));
        let conn = Arc::new(Connection::new(
            key.clone(),
            transport,
            self.defaults.fixups,
        ));
        map.insert(key.clone(), Arc::clone(&conn));
        debug!("registry: created connection {key} ({} total)", map.len());
        conn
    }

    /// Returns the connection for `key` without creating one.
    pub fn get(&self, key: &ConnectionKey) -> Option<Arc<Connection>> {
        self.lock().get(key).cloned()
    }

    /// Validates `key`, resolves its connection and connects it.
    ///
    /// Blocking: call from the worker pool.
    pub fn open(&self, key: &ConnectionKey) -> Result<Arc<Connection>, GatewayError> {
        if key.reader_index() > MAX_READER_INDEX {
            return Err(GatewayError::Validation(format!(
                "reader index {} out of range (max {MAX_READER_INDEX})",
                key.reader_index()
            )));
        }

        let conn = self.get_or_create(key);
        let mut config = self.transport_config(key);
        self.hooks.configure(key, &mut config);
        debug!("registry: connecting {key} with {config:?}");

        conn.connect(&config)?;
        info!("registry: {key} open");
        Ok(conn)
    }

    /// Closes the transport of `key` with a card reset; the entry stays.
    ///
    /// Blocking: call from the worker pool.
    pub fn disconnect(&self, key: &ConnectionKey) {
        if let Some(conn) = self.get(key) {
            conn.disconnect(true);
        }
    }

    /// Resets the card behind `key`; same effect as [`Self::disconnect`].
    pub fn reset(&self, key: &ConnectionKey) {
        self.disconnect(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.lock().contains_key(key)
    }

    /// The settings a connect of `key` starts from, before hooks run.
    pub fn transport_config(&self, key: &ConnectionKey) -> TransportConfig {
        let mut config = TransportConfig::new(key.card_type(), key.reader_index());
        config.reader_hint = self.defaults.reader_hint.clone();
        config.relay = self.defaults.relay.clone();
        config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionKey, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
