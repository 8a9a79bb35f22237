//! Card transports: physical readers, in-process simulators and relays.

pub mod physical;
pub mod remote;
pub mod simulated;

#[cfg(feature = "pcsc")]
pub mod pcsc_backend;

use std::sync::Arc;

use rcard_core::CardType;

use crate::application::{Transport, TransportFactory};
pub use physical::{CardLink, NoReaderBackend, PhysicalTransport, ReaderBackend, ReaderInfo};
pub use remote::RemoteTransport;
pub use simulated::{CardSimulator, SimulatedTransport};

/// Builds the stock transport for each card type.
#[derive(Clone)]
pub struct DefaultTransportFactory {
    reader_backend: Arc<dyn ReaderBackend>,
}

impl DefaultTransportFactory {
    pub fn new(reader_backend: Arc<dyn ReaderBackend>) -> Self {
        Self { reader_backend }
    }

    /// Factory using the system PC/SC service when the `pcsc` feature is on
    /// and the service is reachable, otherwise a backend with no readers.
    pub fn system() -> Self {
        Self::new(system_reader_backend())
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, card_type: CardType) -> Box<dyn Transport> {
        match card_type {
            CardType::Physical => Box::new(PhysicalTransport::new(Arc::clone(&self.reader_backend))),
            CardType::Simulated => Box::new(SimulatedTransport::new()),
            CardType::Remote => Box::new(RemoteTransport::new()),
        }
    }
}

#[cfg(feature = "pcsc")]
fn system_reader_backend() -> Arc<dyn ReaderBackend> {
    match pcsc_backend::PcscBackend::establish() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::warn!("PC/SC unavailable, physical readers disabled: {e}");
            Arc::new(NoReaderBackend)
        }
    }
}

#[cfg(not(feature = "pcsc"))]
fn system_reader_backend() -> Arc<dyn ReaderBackend> {
    tracing::info!("built without PC/SC support, physical readers disabled");
    Arc::new(NoReaderBackend)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_transport_of_requested_kind() {
        let factory = DefaultTransportFactory::new(Arc::new(NoReaderBackend));
        for card_type in [CardType::Physical, CardType::Simulated, CardType::Remote] {
            let transport = factory.create(card_type);
            assert_eq!(transport.kind(), card_type);
            assert!(!transport.is_connected());
        }
    }
}
