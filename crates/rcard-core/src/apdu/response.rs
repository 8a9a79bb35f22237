//! Response APDU type.

use super::command::ApduError;

/// Status word meaning "normal processing".
pub const SW_SUCCESS: u16 = 0x9000;

/// A response APDU split into data and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ResponseApdu {
    /// Splits raw response bytes into data and status word.
    ///
    /// # Errors
    ///
    /// Returns [`ApduError::ResponseTooShort`] when fewer than two bytes are
    /// supplied.
    pub fn parse(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 2 {
            return Err(ApduError::ResponseTooShort(raw.len()));
        }
        let split = raw.len() - 2;
        Ok(Self {
            data: raw[..split].to_vec(),
            sw1: raw[split],
            sw2: raw[split + 1],
        })
    }

    /// Builds a response from data and a status word.
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        let [sw1, sw2] = sw.to_be_bytes();
        Self { data, sw1, sw2 }
    }

    /// Builds a data-less response carrying only `sw`.
    pub fn status(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    pub fn sw(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    pub fn is_success(&self) -> bool {
        self.sw() == SW_SUCCESS
    }

    /// Lowercase hex of the status word without zero padding (`9000`, `6a82`).
    pub fn sw_hex(&self) -> String {
        format!("{:x}", self.sw())
    }

    /// Data followed by `SW1 SW2`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.push(self.sw1);
        out.push(self.sw2);
        out
    }
}
