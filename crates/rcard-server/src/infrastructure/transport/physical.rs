//! Physical reader transport.
//!
//! Reader access goes through the [`ReaderBackend`] seam: the production
//! backend is PC/SC ([`super::pcsc_backend`], behind the `pcsc` feature),
//! tests use a mock.  Without the feature the gateway runs with
//! [`NoReaderBackend`] and every physical connect reports `ReaderNotFound`.
//!
//! # Reader resolution
//!
//! 1. With a reader-name hint, the first reader whose name contains the hint
//!    (ignoring case) is used.
//! 2. Otherwise the reader at the key's index in the enumerated list is used.
//!
//! Either way the chosen reader must report a card present.

use std::sync::Arc;

use rcard_core::CardType;
use tracing::{info, warn};

use crate::application::{Transport, TransportConfig, TransportError};

/// A reader as enumerated by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderInfo {
    pub name: String,
    pub card_present: bool,
}

/// Enumerates readers and opens card channels.
#[cfg_attr(test, mockall::automock)]
pub trait ReaderBackend: Send + Sync {
    fn list_readers(&self) -> Result<Vec<ReaderInfo>, TransportError>;

    fn connect(&self, reader: &str) -> Result<Box<dyn CardLink>, TransportError>;
}

/// An open channel to a card in a reader.
pub trait CardLink: Send {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;

    fn atr(&self) -> Vec<u8>;

    /// Closes the channel, resetting the card when `reset` is set.
    fn disconnect(self: Box<Self>, reset: bool) -> Result<(), TransportError>;
}

/// A backend that never finds a reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReaderBackend;

impl ReaderBackend for NoReaderBackend {
    fn list_readers(&self) -> Result<Vec<ReaderInfo>, TransportError> {
        Ok(Vec::new())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardLink>, TransportError> {
        Err(TransportError::ReaderNotFound(reader.to_string()))
    }
}

/// Picks the reader for `index` / `hint` out of `readers`.
pub fn resolve_reader(
    readers: &[ReaderInfo],
    index: u32,
    hint: Option<&str>,
) -> Result<String, TransportError> {
    let chosen = match hint {
        Some(hint) => {
            let needle = hint.to_lowercase();
            readers
                .iter()
                .find(|r| r.name.to_lowercase().contains(&needle))
                .ok_or_else(|| TransportError::ReaderNotFound(format!("no reader matches '{hint}'")))?
        }
        None => usize::try_from(index)
            .ok()
            .and_then(|i| readers.get(i))
            .ok_or_else(|| {
                TransportError::ReaderNotFound(format!(
                    "reader index {index} out of range ({} readers)",
                    readers.len()
                ))
            })?,
    };

    if !chosen.card_present {
        return Err(TransportError::ReaderNotFound(format!(
            "no card in reader '{}'",
            chosen.name
        )));
    }
    Ok(chosen.name.clone())
}

/// Transport to a card in a local reader.
pub struct PhysicalTransport {
    backend: Arc<dyn ReaderBackend>,
    link: Option<Box<dyn CardLink>>,
    atr: Option<Vec<u8>>,
    reader: Option<String>,
}

impl PhysicalTransport {
    pub fn new(backend: Arc<dyn ReaderBackend>) -> Self {
        Self {
            backend,
            link: None,
            atr: None,
            reader: None,
        }
    }

    /// Name of the reader in use.
    pub fn reader(&self) -> Option<&str> {
        self.reader.as_deref()
    }
}

impl Transport for PhysicalTransport {
    fn kind(&self) -> CardType {
        CardType::Physical
    }

    fn connect(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        let readers = self.backend.list_readers()?;
        let name = resolve_reader(&readers, config.reader_index, config.reader_hint.as_deref())?;

        let link = self.backend.connect(&name)?;
        let atr = link.atr();
        info!("reader '{name}': card connected, ATR {}", hex::encode_upper(&atr));

        self.atr = Some(atr);
        self.link = Some(link);
        self.reader = Some(name);
        Ok(())
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.link
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .transmit(command)
    }

    fn disconnect(&mut self, reset: bool) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.disconnect(reset) {
                warn!(
                    "reader '{}': disconnect failed: {e}",
                    self.reader.as_deref().unwrap_or("?")
                );
            }
        }
        self.atr = None;
    }

    fn atr(&self) -> Option<Vec<u8>> {
        self.atr.clone()
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn reader(name: &str, card_present: bool) -> ReaderInfo {
        ReaderInfo {
            name: name.to_string(),
            card_present,
        }
    }

    /// Link double recording the disconnect disposition.
    struct FakeLink {
        disposition: Arc<Mutex<Option<bool>>>,
    }

    impl CardLink for FakeLink {
        fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
            let mut out = command.to_vec();
            out.extend_from_slice(&[0x90, 0x00]);
            Ok(out)
        }

        fn atr(&self) -> Vec<u8> {
            vec![0x3B, 0x00]
        }

        fn disconnect(self: Box<Self>, reset: bool) -> Result<(), TransportError> {
            *self.disposition.lock().unwrap() = Some(reset);
            Ok(())
        }
    }

    #[test]
    fn test_resolve_by_index_requires_card() {
        let readers = [reader("Reader A", false), reader("Reader B", true)];
        assert_eq!(resolve_reader(&readers, 1, None).unwrap(), "Reader B");
        assert!(matches!(
            resolve_reader(&readers, 0, None),
            Err(TransportError::ReaderNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        let readers = [reader("Reader A", true)];
        assert!(matches!(
            resolve_reader(&readers, 4, None),
            Err(TransportError::ReaderNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_hint_overrides_index_case_insensitively() {
        let readers = [reader("Gemalto PC Twin", true), reader("Yubico YubiKey CCID", true)];
        assert_eq!(
            resolve_reader(&readers, 0, Some("yubikey")).unwrap(),
            "Yubico YubiKey CCID"
        );
    }

    #[test]
    fn test_no_reader_backend_never_connects() {
        // Arrange
        let mut transport = PhysicalTransport::new(Arc::new(NoReaderBackend));

        // Act
        let result = transport.connect(&TransportConfig::new(CardType::Physical, 0));

        // Assert
        assert!(matches!(result, Err(TransportError::ReaderNotFound(_))));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_connect_transmit_disconnect_through_backend() {
        // Arrange
        let disposition = Arc::new(Mutex::new(None));
        let link_disposition = Arc::clone(&disposition);
        let mut backend = MockReaderBackend::new();
        backend
            .expect_list_readers()
            .returning(|| Ok(vec![reader("ACS ACR122", true)]));
        backend
            .expect_connect()
            .withf(|name| name == "ACS ACR122")
            .times(1)
            .returning(move |_| {
                Ok(Box::new(FakeLink {
                    disposition: Arc::clone(&link_disposition),
                }))
            });
        let mut transport = PhysicalTransport::new(Arc::new(backend));

        // Act
        transport
            .connect(&TransportConfig::new(CardType::Physical, 0))
            .unwrap();
        let resp = transport.transmit(&[0x00, 0xCA, 0x00, 0x00, 0x00]).unwrap();
        transport.disconnect(true);

        // Assert
        assert_eq!(resp, vec![0x00, 0xCA, 0x00, 0x00, 0x00, 0x90, 0x00]);
        assert_eq!(transport.reader(), Some("ACS ACR122"));
        assert_eq!(*disposition.lock().unwrap(), Some(true));
        assert!(transport.atr().is_none());
    }

    #[test]
    fn test_backend_listing_error_propagates() {
        let mut backend = MockReaderBackend::new();
        backend
            .expect_list_readers()
            .returning(|| Err(TransportError::Backend("service not running".into())));
        backend.expect_connect().never();
        let mut transport = PhysicalTransport::new(Arc::new(backend));

        let result = transport.connect(&TransportConfig::new(CardType::Physical, 0));

        assert!(matches!(result, Err(TransportError::Backend(_))));
    }
}
