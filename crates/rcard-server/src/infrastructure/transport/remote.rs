//! Remote cards behind a vsmartcard-style relay.
//!
//! The relay speaks the `vpcd` framing over TCP: every message is a 2-byte
//! big-endian length followed by the payload.  A one-byte payload is a
//! control code; anything longer is an APDU.
//!
//! ```text
//!  gateway                         relay (reader n on base port + n)
//!     │── [00 01] 01  POWER_ON ───────►│
//!     │── [00 01] 04  GET_ATR ────────►│
//!     │◄─────────────── [00 nn] ATR ───│
//!     │── [00 nn] APDU ───────────────►│
//!     │◄──────────── [00 mm] RESPONSE ─│
//!     │── [00 01] 00  POWER_OFF ──────►│
//! ```
//!
//! Only the connecting side is implemented; the gateway never listens for
//! relays.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use rcard_core::CardType;
use tracing::{info, warn};

use crate::application::{Transport, TransportConfig, TransportError};

pub const VPCD_POWER_OFF: u8 = 0x00;
pub const VPCD_POWER_ON: u8 = 0x01;
pub const VPCD_RESET: u8 = 0x02;
pub const VPCD_GET_ATR: u8 = 0x04;

/// Socket read/write timeout.
pub const RELAY_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes one length-prefixed frame.
pub fn write_frame<W: Write>(out: &mut W, payload: &[u8]) -> Result<(), TransportError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| TransportError::Backend(format!("frame of {} bytes too long", payload.len())))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(payload)?;
    out.flush()?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub fn read_frame<R: Read>(input: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut header = [0u8; 2];
    input.read_exact(&mut header)?;
    let len = usize::from(u16::from_be_bytes(header));
    let mut payload = vec![0u8; len];
    input.read_exact(&mut payload)?;
    Ok(payload)
}

/// Transport to a card exposed by a relay.
#[derive(Default)]
pub struct RemoteTransport {
    stream: Option<TcpStream>,
    atr: Option<Vec<u8>>,
    peer: Option<String>,
}

impl RemoteTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(address: &str) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(RELAY_IO_TIMEOUT))?;
        stream.set_write_timeout(Some(RELAY_IO_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn power_up(stream: &mut TcpStream) -> Result<Vec<u8>, TransportError> {
        write_frame(stream, &[VPCD_POWER_ON])?;
        write_frame(stream, &[VPCD_GET_ATR])?;
        read_frame(stream)
    }
}

impl Transport for RemoteTransport {
    fn kind(&self) -> CardType {
        CardType::Remote
    }

    fn connect(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        let relay = config
            .relay
            .as_ref()
            .ok_or_else(|| TransportError::ConnectFailed("no relay endpoint configured".into()))?;
        let address = relay.address_for(config.reader_index).ok_or_else(|| {
            TransportError::ConnectFailed(format!(
                "reader index {} out of the relay port range",
                config.reader_index
            ))
        })?;

        let mut stream =
            Self::open(&address).map_err(|e| TransportError::ConnectFailed(format!("{address}: {e}")))?;
        let atr = Self::power_up(&mut stream).map_err(|e| match e {
            TransportError::Io(io) => TransportError::ConnectFailed(format!("{address}: {io}")),
            other => other,
        })?;

        info!("relay {address}: card powered, ATR {}", hex::encode_upper(&atr));
        self.stream = Some(stream);
        self.atr = Some(atr);
        self.peer = Some(address);
        Ok(())
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        write_frame(stream, command)?;
        let response = read_frame(stream)?;
        if response.len() < 2 {
            return Err(TransportError::Backend(format!(
                "relay answered {} bytes, no status word",
                response.len()
            )));
        }
        Ok(response)
    }

    fn disconnect(&mut self, reset: bool) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let code = if reset { VPCD_RESET } else { VPCD_POWER_OFF };
        if let Err(e) = write_frame(&mut stream, &[code]) {
            warn!("relay {}: disconnect failed: {e}", self.peer.as_deref().unwrap_or("?"));
        }
        self.atr = None;
    }

    fn atr(&self) -> Option<Vec<u8>> {
        self.atr.clone()
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
