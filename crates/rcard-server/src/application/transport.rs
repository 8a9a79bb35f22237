//! The transport seam: one blocking contract for every card backend.
//!
//! A [`Transport`] is a connected channel to a card.  The registry owns one
//! per [`Connection`](super::connection::Connection); infrastructure provides
//! the physical, simulated and remote implementations, and tests provide
//! recording doubles.
//!
//! # Why blocking?
//!
//! PC/SC calls and relay round-trips block the calling thread.  The trait is
//! therefore synchronous and every call runs on the bounded
//! [`WorkerPool`](super::worker_pool::WorkerPool), never on an async task.

use std::fmt;
use std::sync::Arc;

use rcard_core::{CardType, GatewayError};
use thiserror::Error;

use super::simulator::{AppletImage, SharedSimulator};
use crate::domain::RelayEndpoint;

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reader matched the index or hint, or the reader has no card.
    #[error("reader not found: {0}")]
    ReaderNotFound(String),

    /// The backend refused or failed the connect.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Auto-select of the configured applet did not answer 9000.
    #[error("applet select failed with SW {sw:04X}")]
    SelectFailed { sw: u16 },

    /// `transmit` was called before a successful `connect`.
    #[error("card not connected")]
    NotConnected,

    /// Socket or device I/O failed mid-exchange.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend reported an error of its own.
    #[error("{0}")]
    Backend(String),
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ReaderNotFound(_)
            | TransportError::ConnectFailed(_)
            | TransportError::SelectFailed { .. } => GatewayError::Connection(err.to_string()),
            TransportError::NotConnected | TransportError::Io(_) | TransportError::Backend(_) => {
                GatewayError::Transmit(err.to_string())
            }
        }
    }
}

/// Per-connect settings.
///
/// The registry builds one from the key and the gateway defaults, then passes
/// it through [`GatewayHooks::configure`](super::registry::GatewayHooks::configure)
/// before connecting.
#[derive(Clone)]
pub struct TransportConfig {
    pub card_type: CardType,
    pub reader_index: u32,
    /// Substring of the physical reader name, preferred over the index.
    pub reader_hint: Option<String>,
    /// Applet to select right after connecting.
    pub aid: Option<Vec<u8>>,
    /// Whether `aid` is selected automatically.
    pub auto_select: bool,
    /// Simulator instance to attach to; a fresh one is built when `None`.
    pub simulator: Option<SharedSimulator>,
    /// Applets installed into a freshly built simulator.
    pub applets: Vec<AppletImage>,
    /// Relay peer for remote cards.
    pub relay: Option<RelayEndpoint>,
}

impl TransportConfig {
    /// Settings with nothing but the card type and reader index filled in.
    pub fn new(card_type: CardType, reader_index: u32) -> Self {
        Self {
            card_type,
            reader_index,
            reader_hint: None,
            aid: None,
            auto_select: true,
            simulator: None,
            applets: Vec::new(),
            relay: None,
        }
    }

    /// The applet to auto-select, if any.
    pub fn select_target(&self) -> Option<&[u8]> {
        match &self.aid {
            Some(aid) if self.auto_select && !aid.is_empty() => Some(aid),
            _ => None,
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("card_type", &self.card_type)
            .field("reader_index", &self.reader_index)
            .field("reader_hint", &self.reader_hint)
            .field("aid", &self.aid.as_ref().map(hex::encode_upper))
            .field("auto_select", &self.auto_select)
            .field("simulator", &self.simulator.is_some())
            .field("applets", &self.applets.len())
            .field("relay", &self.relay)
            .finish()
    }
}

/// A channel to a card backend.
///
/// Implementations track their own connected state: `transmit` fails with
/// [`TransportError::NotConnected`] until `connect` succeeds and again after
/// `disconnect`.
pub trait Transport: Send {
    /// The backend kind, reported as `ctype`.
    fn kind(&self) -> CardType;

    /// Opens the channel.
    fn connect(&mut self, config: &TransportConfig) -> Result<(), TransportError>;

    /// Sends raw command bytes and returns the raw response, SW included.
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Closes the channel, resetting the card when `reset` is set.
    ///
    /// Idempotent; backend errors are logged, not returned.
    fn disconnect(&mut self, reset: bool);

    /// The card's Answer-To-Reset while connected.
    fn atr(&self) -> Option<Vec<u8>>;

    fn is_connected(&self) -> bool;
}

/// Builds the default transport for a key's card type.
pub trait TransportFactory: Send + Sync {
    fn create(&self, card_type: CardType) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(CardType) -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self, card_type: CardType) -> Box<dyn Transport> {
        self(card_type)
    }
}

/// Shared factory handle.
pub type SharedTransportFactory = Arc<dyn TransportFactory>;

// ── Tests ─────────────────────────────────────────────────────────────────────
