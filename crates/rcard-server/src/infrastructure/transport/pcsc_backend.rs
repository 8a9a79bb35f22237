//! PC/SC reader backend (feature `pcsc`).

use std::ffi::CString;

use pcsc::{Attribute, Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};
use tracing::debug;

use super::physical::{CardLink, ReaderBackend, ReaderInfo};
use crate::application::TransportError;

impl From<pcsc::Error> for TransportError {
    fn from(err: pcsc::Error) -> Self {
        TransportError::Backend(format!("PC/SC: {err}"))
    }
}

/// Reader backend over the system PC/SC service.
pub struct PcscBackend {
    context: Context,
}

impl PcscBackend {
    /// Establishes a user-scope PC/SC context.
    pub fn establish() -> Result<Self, TransportError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }
}

impl ReaderBackend for PcscBackend {
    fn list_readers(&self) -> Result<Vec<ReaderInfo>, TransportError> {
        let names = match self.context.list_readers_owned() {
            Ok(names) => names,
            Err(pcsc::Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut readers = Vec::with_capacity(names.len());
        for name in names {
            let mut states = vec![ReaderState::new(name.as_c_str(), State::UNAWARE)];
            let card_present = match self.context.get_status_change(None, &mut states) {
                Ok(()) => {
                    let state = states[0].event_state();
                    state.contains(State::PRESENT) && !state.contains(State::EMPTY)
                }
                Err(e) => {
                    debug!("status of {:?} unavailable: {e}", name);
                    false
                }
            };
            readers.push(ReaderInfo {
                name: name.to_string_lossy().into_owned(),
                card_present,
            });
        }
        Ok(readers)
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardLink>, TransportError> {
        let name = CString::new(reader)
            .map_err(|_| TransportError::ReaderNotFound(reader.to_string()))?;
        let card = match self.context.connect(&name, ShareMode::Shared, Protocols::ANY) {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard) => {
                return Err(TransportError::ReaderNotFound(format!("no card in reader '{reader}'")))
            }
            Err(e) => return Err(TransportError::ConnectFailed(format!("{reader}: {e}"))),
        };
        let atr = card.get_attribute_owned(Attribute::AtrString).unwrap_or_default();
        Ok(Box::new(PcscLink { card, atr }))
    }
}

struct PcscLink {
    card: Card,
    atr: Vec<u8>,
}

impl CardLink for PcscLink {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        let response = self.card.transmit(command, &mut buffer)?;
        Ok(response.to_vec())
    }

    fn atr(&self) -> Vec<u8> {
        self.atr.clone()
    }

    fn disconnect(self: Box<Self>, reset: bool) -> Result<(), TransportError> {
        let disposition = if reset {
            Disposition::ResetCard
        } else {
            Disposition::LeaveCard
        };
        self.card
            .disconnect(disposition)
            .map_err(|(_, e)| TransportError::from(e))
    }
}
