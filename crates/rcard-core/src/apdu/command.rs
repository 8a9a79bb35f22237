//! Command APDU type.

use std::fmt;

use thiserror::Error;

use crate::protocol::error::GatewayError;

/// `INS` byte of ISO 7816-4 SELECT.
pub const INS_SELECT: u8 = 0xA4;

/// `P1` of SELECT meaning "select by DF name (AID)".
pub const P1_SELECT_BY_NAME: u8 = 0x04;

/// Errors raised while decoding or building APDUs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApduError {
    /// The input is not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Fewer than four header bytes were supplied.
    #[error("command APDU too short: {0} bytes, need at least 4")]
    TooShort(usize),

    /// The `Lc` byte does not agree with the bytes that follow it.
    #[error("Lc declares {declared} data bytes but {actual} bytes follow the header")]
    LengthMismatch { declared: usize, actual: usize },

    /// `Lc = 00` followed by more bytes, i.e. an extended-length APDU.
    #[error("extended-length APDUs are not supported")]
    ExtendedLength,

    /// More than 255 data bytes for a short APDU.
    #[error("command data too long: {0} bytes, maximum is 255")]
    DataTooLong(usize),

    /// A response shorter than the two status-word bytes.
    #[error("response APDU too short: {0} bytes, need at least 2")]
    ResponseTooShort(usize),
}

impl From<ApduError> for GatewayError {
    fn from(err: ApduError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

/// A short (non-extended) command APDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    /// Command data; empty for cases 1 and 2.
    pub data: Vec<u8>,
    /// Expected response length byte; `Some(0)` means 256.
    pub le: Option<u8>,
}

impl CommandApdu {
    /// Builds a command from its header and data, without `Le`.
    ///
    /// # Errors
    ///
    /// Returns [`ApduError::DataTooLong`] if `data` exceeds 255 bytes.
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Self, ApduError> {
        if data.len() > 255 {
            return Err(ApduError::DataTooLong(data.len()));
        }
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data: data.to_vec(),
            le: None,
        })
    }

    /// Builds `00 A4 04 00 Lc <aid>`: SELECT by AID.
    pub fn select(aid: &[u8]) -> Result<Self, ApduError> {
        Self::new(0x00, INS_SELECT, P1_SELECT_BY_NAME, 0x00, aid)
    }

    /// Parses raw bytes following the four ISO 7816-4 short cases.
    ///
    /// # Errors
    ///
    /// See [`ApduError`] for the rejected shapes.
    pub fn parse(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 4 {
            return Err(ApduError::TooShort(raw.len()));
        }
        let (cla, ins, p1, p2) = (raw[0], raw[1], raw[2], raw[3]);
        let header = |data: &[u8], le: Option<u8>| Self {
            cla,
            ins,
            p1,
            p2,
            data: data.to_vec(),
            le,
        };

        match raw.len() {
            4 => Ok(header(&[], None)),
            5 => Ok(header(&[], Some(raw[4]))),
            _ => {
                let lc = raw[4] as usize;
                if lc == 0 {
                    return Err(ApduError::ExtendedLength);
                }
                let body = &raw[5..];
                if body.len() == lc {
                    Ok(header(body, None))
                } else if body.len() == lc + 1 {
                    Ok(header(&body[..lc], Some(body[lc])))
                } else {
                    Err(ApduError::LengthMismatch {
                        declared: lc,
                        actual: body.len(),
                    })
                }
            }
        }
    }

    /// Decodes a hex string (whitespace ignored) and parses it.
    pub fn from_hex(text: &str) -> Result<Self, ApduError> {
        Self::parse(&decode_hex(text)?)
    }

    /// Returns `true` for SELECT-by-AID commands.
    pub fn is_select_by_name(&self) -> bool {
        self.ins == INS_SELECT && self.p1 == P1_SELECT_BY_NAME
    }

    /// Serializes the command back to its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            // Length was checked at construction; parse never yields more than 255.
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(le);
        }
        out
    }
}

impl fmt::Display for CommandApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.to_bytes()))
    }
}

/// Decodes hex text, tolerating embedded whitespace.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, ApduError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|e| ApduError::InvalidHex(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
