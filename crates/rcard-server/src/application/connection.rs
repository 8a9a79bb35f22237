//! A pooled card connection.
//!
//! A [`Connection`] owns exactly one [`Transport`] plus the bookkeeping the
//! action handlers report on: connected flag, transport kind in use, ATR,
//! last command, last round-trip latency and the answer to the auto-select.
//!
//! # Locking
//!
//! ```text
//! transport lock ── held for the whole card round trip (connect, transmit)
//!      └─► stats lock ── held only to copy values in or out
//! ```
//!
//! Two requests for the same key never interleave their APDUs on the wire.
//! Status reads (`is_connected`, `atr`, `last_kind`, `stats`) take only the
//! stats lock, so they answer while a slow card holds the transport.  The
//! stats lock is never held while the transport lock is taken, and the
//! registry lock is never held while either is taken.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rcard_core::{normalize, ApduFixups, CardType, CommandApdu, ConnectionKey, ResponseApdu};
use tracing::{debug, info, warn};

use super::transport::{Transport, TransportConfig, TransportError};

/// Snapshot of a connection's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connected: bool,
    pub last_kind: Option<CardType>,
    pub atr: Option<Vec<u8>>,
    pub last_command: Option<Vec<u8>>,
    pub last_latency: Option<Duration>,
    pub applet_id: Option<Vec<u8>>,
    pub select_response: Option<ResponseApdu>,
}

/// A lazily created, never automatically destroyed card connection.
pub struct Connection {
    key: ConnectionKey,
    fixups: ApduFixups,
    transport: Mutex<Box<dyn Transport>>,
    stats: Mutex<ConnectionStats>,
}

impl Connection {
    pub fn new(key: ConnectionKey, transport: Box<dyn Transport>, fixups: ApduFixups) -> Self {
        Self {
            key,
            fixups,
            transport: Mutex::new(transport),
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Connects the transport and, when configured, selects the applet.
    ///
    /// An existing channel is closed first (without reset).  If the select
    /// answers anything but `9000` the channel is closed again and
    /// [`TransportError::SelectFailed`] is returned.
    pub fn connect(&self, config: &TransportConfig) -> Result<(), TransportError> {
        let mut transport = self.lock_transport();
        if transport.is_connected() {
            debug!("{}: reconnecting, closing previous channel", self.key);
            transport.disconnect(false);
        }
        self.mark_disconnected();

        transport.connect(config)?;
        let kind = transport.kind();
        {
            let mut stats = self.lock_stats();
            stats.connected = true;
            stats.last_kind = Some(kind);
            stats.atr = transport.atr();
            stats.applet_id = config.aid.clone();
            stats.select_response = None;
        }
        info!("{}: connected ({kind})", self.key);

        if let Some(aid) = config.select_target() {
            let select = CommandApdu::select(aid)
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            match self.exchange(&mut **transport, &select) {
                Ok(resp) if resp.is_success() => {
                    info!("{}: selected applet {}", self.key, hex::encode_upper(aid));
                    self.lock_stats().select_response = Some(resp);
                }
                Ok(resp) => {
                    warn!(
                        "{}: select of {} answered {:04X}",
                        self.key,
                        hex::encode_upper(aid),
                        resp.sw()
                    );
                    transport.disconnect(false);
                    self.mark_disconnected();
                    return Err(TransportError::SelectFailed { sw: resp.sw() });
                }
                Err(e) => {
                    transport.disconnect(false);
                    self.mark_disconnected();
                    return Err(TransportError::ConnectFailed(format!("applet select: {e}")));
                }
            }
        }
        Ok(())
    }

    /// Normalizes `command` and sends it to the card.
    ///
    /// A failed exchange leaves the connection as the transport reports it;
    /// the caller may retry or reset.
    pub fn transmit(&self, command: &CommandApdu) -> Result<ResponseApdu, TransportError> {
        let mut transport = self.lock_transport();
        if !transport.is_connected() {
            self.mark_disconnected();
            return Err(TransportError::NotConnected);
        }
        self.exchange(&mut **transport, command)
    }

    /// Closes the transport; the connection itself stays registered.
    pub fn disconnect(&self, reset: bool) {
        let mut transport = self.lock_transport();
        transport.disconnect(reset);
        self.mark_disconnected();
        debug!("{}: disconnected (reset={reset})", self.key);
    }

    pub fn is_connected(&self) -> bool {
        self.lock_stats().connected
    }

    /// The transport kind of the last successful connect.
    pub fn last_kind(&self) -> Option<CardType> {
        self.lock_stats().last_kind
    }

    /// The ATR, or `None` when not connected.
    pub fn atr(&self) -> Option<Vec<u8>> {
        let stats = self.lock_stats();
        if stats.connected {
            stats.atr.clone()
        } else {
            None
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        self.lock_stats().clone()
    }

    // ── Internals ──────────────────────────────────────────────────────────────

    fn lock_transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, ConnectionStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_disconnected(&self) {
        let mut stats = self.lock_stats();
        stats.connected = false;
        stats.atr = None;
    }

    fn exchange(
        &self,
        transport: &mut dyn Transport,
        command: &CommandApdu,
    ) -> Result<ResponseApdu, TransportError> {
        let wire = normalize(command, &self.fixups).to_bytes();
        debug!("{} --> {}", self.key, hex::encode_upper(&wire));

        let started = Instant::now();
        let result = transport.transmit(&wire).and_then(|raw| {
            ResponseApdu::parse(&raw).map_err(|e| TransportError::Backend(e.to_string()))
        });
        let elapsed = started.elapsed();
        let still_connected = transport.is_connected();

        {
            let mut stats = self.lock_stats();
            stats.last_command = Some(wire);
            stats.last_latency = Some(elapsed);
            if !still_connected {
                stats.connected = false;
                stats.atr = None;
            }
        }

        match result {
            Ok(resp) => {
                debug!(
                    "{} <-- {} [{} ms]",
                    self.key,
                    hex::encode_upper(resp.to_bytes()),
                    elapsed.as_millis()
                );
                Ok(resp)
            }
            Err(e) => {
                warn!("{}: transmit failed: {e}", self.key);
                Err(e)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
