//! Action request and response objects.
//!
//! # JSON shape
//!
//! ```json
//! {"action":"select","target":"sim","idx":0,"csess":"alice","aid":"01FFFF0405060708090102","rid":3}
//! ```
//!
//! All request fields except `action` are optional.  Unknown fields are
//! ignored so newer clients keep working against older gateways.
//!
//! # Why a closed action enum?
//!
//! The `action` tag is decoded into [`ActionKind`], so the dispatcher can
//! `match` on it exhaustively.  Adding an action is a compile error at every
//! place that must handle it.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::apdu::response::ResponseApdu;
use crate::protocol::error::GatewayError;

// ── Requests ──────────────────────────────────────────────────────────────────

/// A decoded action request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// The action tag, see [`ActionKind`].
    #[serde(default)]
    pub action: Option<String>,

    /// `"card"`, `"sim"` or `"remote"`; defaults to `"card"`.
    #[serde(default)]
    pub target: Option<String>,

    /// Reader index; only honoured when the deployment allows picking readers.
    #[serde(default, deserialize_with = "lenient_index")]
    pub idx: Option<i64>,

    /// Session token selecting a private simulator.
    #[serde(default)]
    pub csess: Option<String>,

    /// Hex command APDU for `send`.
    #[serde(default)]
    pub apdu: Option<String>,

    /// Hex applet identifier for `select`.
    #[serde(default)]
    pub aid: Option<String>,

    /// Opaque request id echoed back on session-oriented responses.
    #[serde(default)]
    pub rid: Option<Value>,
}

impl ActionRequest {
    /// Builds a request carrying only an action tag.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            action: Some(kind.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Decodes one JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Protocol`] when `text` is not a JSON object or a
    /// known field has the wrong type.
    pub fn from_json(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    /// Resolves the `action` tag.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownAction`] when the tag is missing or not
    /// recognised.
    pub fn kind(&self) -> Result<ActionKind, GatewayError> {
        match self.action.as_deref() {
            Some(tag) => tag.parse(),
            None => Err(GatewayError::UnknownAction(None)),
        }
    }
}

/// Accepts `idx` as a JSON number or a numeric string.
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("idx is not an integer: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("idx is not an integer: {s:?}"))),
        Some(other) => Err(de::Error::custom(format!(
            "idx must be a number, got {other}"
        ))),
    }
}

/// The closed set of supported actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Ping,
    Shutdown,
    Reset,
    Disconnect,
    Connect,
    IsConnected,
    Atr,
    Send,
    Select,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Ping,
        ActionKind::Shutdown,
        ActionKind::Reset,
        ActionKind::Disconnect,
        ActionKind::Connect,
        ActionKind::IsConnected,
        ActionKind::Atr,
        ActionKind::Send,
        ActionKind::Select,
    ];

    /// The wire tag of this action.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Ping => "ping",
            ActionKind::Shutdown => "shutdown",
            ActionKind::Reset => "reset",
            ActionKind::Disconnect => "disconnect",
            ActionKind::Connect => "connect",
            ActionKind::IsConnected => "is_connected",
            ActionKind::Atr => "atr",
            ActionKind::Send => "send",
            ActionKind::Select => "select",
        }
    }

    /// Actions that address a card and therefore need a connection key.
    pub fn targets_card(self) -> bool {
        !matches!(self, ActionKind::Ping | ActionKind::Shutdown)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GatewayError::UnknownAction(Some(s.to_string())))
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// An action response.
///
/// `result` and `num_connections` are always present; every other field is
/// omitted from the JSON when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// WebSocket session id; absent on REST responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Echo of the request's `rid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<Value>,

    /// `0` on success, negative on failure.
    pub result: i32,

    /// Clients connected to the gateway when the response was built.
    pub num_connections: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,

    /// Transport kind last used by the connection (`card`, `sim`, `remote`, `?`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctype: Option<String>,

    /// Uppercase hex ATR, empty when not connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr: Option<String>,

    /// Uppercase hex of the full response APDU, data followed by SW.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_hex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw1: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw2: Option<u8>,
}

impl ActionResponse {
    /// A successful response skeleton.
    pub fn new(num_connections: usize) -> Self {
        Self {
            num_connections,
            ..Self::default()
        }
    }

    /// Attaches the session id and echoes `rid`.
    pub fn with_session(mut self, session: &str, rid: Option<Value>) -> Self {
        self.session = Some(session.to_string());
        self.rid = rid;
        self
    }

    /// Marks the response as failed with `err`.
    pub fn fail(mut self, err: &GatewayError) -> Self {
        self.result = err.result_code();
        self.error = Some(err.to_string());
        self
    }

    /// Fills the card-response fields from `resp`.
    pub fn with_card_response(mut self, resp: &ResponseApdu) -> Self {
        self.response = Some(hex::encode_upper(resp.to_bytes()));
        self.sw = Some(resp.sw());
        self.sw_hex = Some(resp.sw_hex());
        self.sw1 = Some(resp.sw1);
        self.sw2 = Some(resp.sw2);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result >= 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
