//! In-process simulated cards.
//!
//! [`CardSimulator`] is a minimal card runtime: it keeps a list of installed
//! applets, routes SELECT-by-AID to the matching one and hands every other
//! command to the currently selected applet.  [`SimulatedTransport`] plugs a
//! simulator into the [`Transport`] contract.
//!
//! # Status words produced by the runtime itself
//!
//! | Situation                          | SW     |
//! |------------------------------------|--------|
//! | unparseable command                | `6700` |
//! | SELECT of an unknown AID           | `6A82` |
//! | applet refused selection           | `6999` |
//! | command with no applet selected    | `6986` |

use std::sync::{Arc, Mutex, PoisonError};

use rcard_core::{CardType, CommandApdu, ResponseApdu};
use tracing::{debug, info};

use crate::application::{
    Applet, SharedSimulator, SimulatorEngine, Transport, TransportConfig, TransportError,
};

/// ATR reported by simulators built with [`CardSimulator::new`].
pub const DEFAULT_ATR: [u8; 20] = [
    0x3B, 0xFA, 0x18, 0x00, 0x00, 0x81, 0x31, 0xFE, 0x45, 0x4A, 0x43, 0x4F, 0x50, 0x33, 0x31, 0x56,
    0x32, 0x33, 0x32, 0x98,
];

pub const SW_WRONG_LENGTH: u16 = 0x6700;
pub const SW_FILE_NOT_FOUND: u16 = 0x6A82;
pub const SW_SELECT_REFUSED: u16 = 0x6999;
pub const SW_NO_APPLET_SELECTED: u16 = 0x6986;

struct InstalledApplet {
    aid: Vec<u8>,
    applet: Box<dyn Applet>,
}

/// A simulated card holding applets.
pub struct CardSimulator {
    atr: Vec<u8>,
    applets: Vec<InstalledApplet>,
    selected: Option<usize>,
}

impl CardSimulator {
    pub fn new() -> Self {
        Self::with_atr(DEFAULT_ATR.to_vec())
    }

    pub fn with_atr(atr: Vec<u8>) -> Self {
        Self {
            atr,
            applets: Vec::new(),
            selected: None,
        }
    }

    /// Wraps the simulator for sharing between connections.
    pub fn into_shared(self) -> SharedSimulator {
        Arc::new(Mutex::new(self))
    }

    pub fn selected_aid(&self) -> Option<&[u8]> {
        self.selected.map(|i| self.applets[i].aid.as_slice())
    }

    fn select(&mut self, cmd: &CommandApdu) -> ResponseApdu {
        let Some(index) = self.applets.iter().position(|a| a.aid == cmd.data) else {
            return ResponseApdu::status(SW_FILE_NOT_FOUND);
        };
        if let Some(previous) = self.selected.take() {
            self.applets[previous].applet.deselect();
        }
        let target = &mut self.applets[index];
        if !target.applet.select() {
            return ResponseApdu::status(SW_SELECT_REFUSED);
        }
        self.selected = Some(index);
        debug!("simulator: selected {}", hex::encode_upper(&target.aid));
        target.applet.process(cmd)
    }
}

impl Default for CardSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorEngine for CardSimulator {
    fn install(&mut self, aid: &[u8], applet: Box<dyn Applet>) -> Result<(), TransportError> {
        if self.applets.iter().any(|a| a.aid == aid) {
            return Err(TransportError::Backend(format!(
                "applet {} already installed",
                hex::encode_upper(aid)
            )));
        }
        self.applets.push(InstalledApplet {
            aid: aid.to_vec(),
            applet,
        });
        Ok(())
    }

    fn reset(&mut self) -> Vec<u8> {
        if let Some(previous) = self.selected.take() {
            self.applets[previous].applet.deselect();
        }
        self.atr.clone()
    }

    fn atr(&self) -> Vec<u8> {
        self.atr.clone()
    }

    fn process(&mut self, command: &[u8]) -> Vec<u8> {
        let Ok(cmd) = CommandApdu::parse(command) else {
            return ResponseApdu::status(SW_WRONG_LENGTH).to_bytes();
        };
        let resp = if cmd.is_select_by_name() {
            self.select(&cmd)
        } else {
            match self.selected {
                Some(i) => self.applets[i].applet.process(&cmd),
                None => ResponseApdu::status(SW_NO_APPLET_SELECTED),
            }
        };
        resp.to_bytes()
    }
}

/// Transport backed by a [`SimulatorEngine`].
#[derive(Default)]
pub struct SimulatedTransport {
    engine: Option<SharedSimulator>,
    atr: Option<Vec<u8>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for SimulatedTransport {
    fn kind(&self) -> CardType {
        CardType::Simulated
    }

    fn connect(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        let engine = match &config.simulator {
            Some(shared) => Arc::clone(shared),
            None => {
                let mut fresh = CardSimulator::new();
                for image in &config.applets {
                    image.install_into(&mut fresh)?;
                }
                fresh.into_shared()
            }
        };
        let atr = engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        info!(
            "simulated card {} powered up, ATR {}",
            config.reader_index,
            hex::encode_upper(&atr)
        );
        self.atr = Some(atr);
        self.engine = Some(engine);
        Ok(())
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let engine = self.engine.as_ref().ok_or(TransportError::NotConnected)?;
        let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(engine.process(command))
    }

    fn disconnect(&mut self, reset: bool) {
        if let Some(engine) = self.engine.take() {
            if reset {
                engine.lock().unwrap_or_else(PoisonError::into_inner).reset();
            }
        }
        self.atr = None;
    }

    fn atr(&self) -> Option<Vec<u8>> {
        self.atr.clone()
    }

    fn is_connected(&self) -> bool {
        self.engine.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
