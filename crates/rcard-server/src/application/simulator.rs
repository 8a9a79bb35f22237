//! The simulator seam: card simulators and the applets installed in them.
//!
//! The gateway does not run real card applets.  It talks to a
//! [`SimulatorEngine`] that accepts raw APDUs and returns raw responses, the
//! way a card would.  A small engine ships in
//! [`infrastructure::transport::simulated`](crate::infrastructure::transport::simulated);
//! embedders can plug their own through
//! [`TransportConfig::simulator`](super::transport::TransportConfig::simulator).

use std::fmt;
use std::sync::{Arc, Mutex};

use rcard_core::{CommandApdu, ResponseApdu};

use super::transport::TransportError;

/// One applet inside a simulated card.
pub trait Applet: Send {
    /// Called when the applet is selected; returning `false` refuses selection.
    fn select(&mut self) -> bool {
        true
    }

    /// Called when another applet is selected or the card is reset.
    fn deselect(&mut self) {}

    /// Handles a command addressed to the selected applet.
    ///
    /// The SELECT that activated the applet is passed in too.
    fn process(&mut self, command: &CommandApdu) -> ResponseApdu;
}

/// An in-process card.
pub trait SimulatorEngine: Send {
    /// Installs `applet` under `aid`.
    fn install(&mut self, aid: &[u8], applet: Box<dyn Applet>) -> Result<(), TransportError>;

    /// Resets the card (deselects everything) and returns the ATR.
    fn reset(&mut self) -> Vec<u8>;

    fn atr(&self) -> Vec<u8>;

    /// Processes one raw command APDU and returns the raw response.
    fn process(&mut self, command: &[u8]) -> Vec<u8>;
}

/// A simulator shared between connections or with the embedder.
pub type SharedSimulator = Arc<Mutex<dyn SimulatorEngine>>;

type AppletConstructor = dyn Fn() -> Box<dyn Applet> + Send + Sync;

/// An installable applet: its AID and a constructor.
///
/// A fresh simulator gets a fresh applet instance from every image, so state
/// never leaks between simulators.
#[derive(Clone)]
pub struct AppletImage {
    aid: Vec<u8>,
    constructor: Arc<AppletConstructor>,
}

impl AppletImage {
    pub fn new<F>(aid: &[u8], constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Applet> + Send + Sync + 'static,
    {
        Self {
            aid: aid.to_vec(),
            constructor: Arc::new(constructor),
        }
    }

    pub fn aid(&self) -> &[u8] {
        &self.aid
    }

    pub fn instantiate(&self) -> Box<dyn Applet> {
        (self.constructor)()
    }

    /// Installs a fresh instance into `engine`.
    pub fn install_into(&self, engine: &mut dyn SimulatorEngine) -> Result<(), TransportError> {
        engine.install(&self.aid, self.instantiate())
    }
}

impl fmt::Debug for AppletImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppletImage")
            .field("aid", &hex::encode_upper(&self.aid))
            .finish_non_exhaustive()
    }
}
