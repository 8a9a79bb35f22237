//! Connection identity: which card a request is talking to.
//!
//! # How clients name a card (for beginners)
//!
//! A request says *what kind* of card it wants (`"card"` for a physical
//! reader, `"sim"` for the in-process simulator, `"remote"` for a relay
//! peer) and *which one* (a reader index).  Simulated cards may additionally
//! carry a session token so that two clients can each get a private
//! simulator on the same index:
//!
//! ```text
//! ("sim", 0, "alice")  ──►  simulator #1
//! ("sim", 0, "bob")    ──►  simulator #2
//! ("sim", 0, -)        ──►  simulator #3 (shared)
//! ("card", 0, -)       ──►  first physical reader
//! ```
//!
//! Physical readers and relay channels are real, shared resources, so a
//! session token on those card types is rejected instead of silently creating
//! a second handle to the same hardware.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::error::GatewayError;

/// Highest reader index accepted by `connect`.
pub const MAX_READER_INDEX: u32 = 1024;

/// The kind of backend a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    /// A card inserted in a PC/SC reader attached to the gateway host.
    Physical,
    /// An in-process card simulator.
    Simulated,
    /// A card reached through a remote relay (vsmartcard style).
    Remote,
}

impl CardType {
    /// The target string clients use for this card type.
    pub fn as_target(self) -> &'static str {
        match self {
            CardType::Physical => "card",
            CardType::Simulated => "sim",
            CardType::Remote => "remote",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_target())
    }
}

impl FromStr for CardType {
    type Err = GatewayError;

    /// Parses a request `target` string, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "card" => Ok(CardType::Physical),
            "sim" => Ok(CardType::Simulated),
            "remote" => Ok(CardType::Remote),
            other => Err(GatewayError::Validation(format!("No such target: {other}"))),
        }
    }
}

/// Identity of a pooled card connection.
///
/// Two keys are equal when all three components are equal.  The session token
/// is only ever `Some` for [`CardType::Simulated`]; [`ConnectionKey::new`]
/// enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    card_type: CardType,
    reader_index: u32,
    session_token: Option<String>,
}

impl ConnectionKey {
    /// Builds a key, validating the session-token rule.
    ///
    /// A blank (empty or whitespace-only) token is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if a non-blank token is supplied
    /// for a card type other than [`CardType::Simulated`].
    pub fn new(
        card_type: CardType,
        reader_index: u32,
        session_token: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let session_token = session_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);

        if session_token.is_some() && card_type != CardType::Simulated {
            return Err(GatewayError::Validation(
                "csess is only allowed for simulated cards".to_string(),
            ));
        }

        Ok(Self {
            card_type,
            reader_index,
            session_token,
        })
    }

    /// Shorthand for a key without a session token.
    pub fn shared(card_type: CardType, reader_index: u32) -> Self {
        Self {
            card_type,
            reader_index,
            session_token: None,
        }
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    pub fn reader_index(&self) -> u32 {
        self.reader_index
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_token {
            Some(token) => write!(f, "{}:{}:{}", self.card_type, self.reader_index, token),
            None => write!(f, "{}:{}", self.card_type, self.reader_index),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_card_type_parses_targets_case_insensitively() {
        assert_eq!("card".parse::<CardType>().unwrap(), CardType::Physical);
        assert_eq!("SIM".parse::<CardType>().unwrap(), CardType::Simulated);
        assert_eq!("Remote".parse::<CardType>().unwrap(), CardType::Remote);
    }

    #[test]
    fn test_card_type_rejects_unknown_target() {
        // Act
        let err = "floppy".parse::<CardType>().unwrap_err();

        // Assert
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.to_string().contains("floppy"));
    }

    #[test]
    fn test_session_token_on_physical_card_is_rejected() {
        // Act
        let result = ConnectionKey::new(CardType::Physical, 0, Some("abc"));

        // Assert
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[test]
    fn test_session_token_on_remote_card_is_rejected() {
        let result = ConnectionKey::new(CardType::Remote, 2, Some("abc"));
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_session_token_is_treated_as_absent() {
        // Arrange / Act
        let key = ConnectionKey::new(CardType::Physical, 1, Some("   ")).unwrap();

        // Assert
        assert_eq!(key, ConnectionKey::shared(CardType::Physical, 1));
        assert_eq!(key.session_token(), None);
    }

    #[test]
    fn test_session_token_participates_in_simulated_identity() {
        // Arrange
        let alice = ConnectionKey::new(CardType::Simulated, 0, Some("alice")).unwrap();
        let bob = ConnectionKey::new(CardType::Simulated, 0, Some("bob")).unwrap();
        let shared = ConnectionKey::shared(CardType::Simulated, 0);

        // Act
        let set: HashSet<_> = [alice.clone(), bob, shared, alice].into_iter().collect();

        // Assert: the duplicate alice collapses, the rest are distinct.
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_display_includes_token_only_when_present() {
        let plain = ConnectionKey::shared(CardType::Physical, 3);
        let sim = ConnectionKey::new(CardType::Simulated, 0, Some("t1")).unwrap();
        assert_eq!(plain.to_string(), "card:3");
        assert_eq!(sim.to_string(), "sim:0:t1");
    }
}
