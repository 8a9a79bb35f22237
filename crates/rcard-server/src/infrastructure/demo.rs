//! Demo applets and the hooks that install them into simulated cards.
//!
//! With [`DemoHooks`] in place every simulated connection gets a fresh
//! simulator holding two applets:
//!
//! | Applet          | AID                       | Behaviour                            |
//! |-----------------|---------------------------|--------------------------------------|
//! | [`RandomApplet`]| `01FFFF0405060708090102`  | 32 random bytes + `9000` per command |
//! | [`EchoApplet`]  | `01FFFF0405060708090103`  | echoes command data + `9000`         |
//!
//! No applet is selected on connect; clients send a `select` first.

use rcard_core::{CardType, CommandApdu, ConnectionKey, ResponseApdu};
use rand::RngCore;
use tracing::debug;

use crate::application::{Applet, AppletImage, GatewayHooks, TransportConfig};

pub const RANDOM_APPLET_AID: [u8; 11] = [
    0x01, 0xFF, 0xFF, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x01, 0x02,
];

pub const ECHO_APPLET_AID: [u8; 11] = [
    0x01, 0xFF, 0xFF, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x01, 0x03,
];

/// Bytes returned by [`RandomApplet`] per command.
pub const RANDOM_RESPONSE_LEN: usize = 32;

/// Answers every command, SELECT included, with fresh random bytes.
#[derive(Debug, Default)]
pub struct RandomApplet;

impl Applet for RandomApplet {
    fn process(&mut self, _command: &CommandApdu) -> ResponseApdu {
        let mut data = vec![0u8; RANDOM_RESPONSE_LEN];
        rand::rng().fill_bytes(&mut data);
        ResponseApdu::new(data, 0x9000)
    }
}

/// Echoes the command data back; SELECT answers a bare `9000`.
#[derive(Debug, Default)]
pub struct EchoApplet;

impl Applet for EchoApplet {
    fn process(&mut self, command: &CommandApdu) -> ResponseApdu {
        if command.is_select_by_name() {
            return ResponseApdu::status(0x9000);
        }
        ResponseApdu::new(command.data.clone(), 0x9000)
    }
}

/// Images of both demo applets.
pub fn demo_applets() -> Vec<AppletImage> {
    vec![
        AppletImage::new(&RANDOM_APPLET_AID, || Box::new(RandomApplet)),
        AppletImage::new(&ECHO_APPLET_AID, || Box::new(EchoApplet)),
    ]
}

/// Installs the demo applets into every simulated card.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoHooks;

impl GatewayHooks for DemoHooks {
    fn configure(&self, key: &ConnectionKey, config: &mut TransportConfig) {
        if key.card_type() != CardType::Simulated || config.simulator.is_some() {
            return;
        }
        config.applets.extend(demo_applets());
        debug!(
            "{key}: installing demo applets {} and {}",
            hex::encode_upper(RANDOM_APPLET_AID),
            hex::encode_upper(ECHO_APPLET_AID)
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_applet_returns_32_bytes_and_success() {
        // Act
        let a = RandomApplet.process(&CommandApdu::from_hex("00000000").unwrap());
        let b = RandomApplet.process(&CommandApdu::from_hex("00000000").unwrap());

        // Assert
        assert_eq!(a.data.len(), RANDOM_RESPONSE_LEN);
        assert!(a.is_success());
        assert_ne!(a.data, b.data, "two answers should differ");
    }

    #[test]
    fn test_random_applet_bytes_carry_no_fixed_bits() {
        // Arrange
        let samples: Vec<Vec<u8>> = (0..64)
            .map(|_| RandomApplet.process(&CommandApdu::from_hex("00000000").unwrap()).data)
            .collect();

        // Assert: no byte position keeps a constant high nibble across samples.
        for pos in 0..RANDOM_RESPONSE_LEN {
            let first = samples[0][pos] >> 4;
            assert!(
                samples.iter().any(|s| s[pos] >> 4 != first),
                "high nibble of byte {pos} never varies"
            );
        }
    }

    #[test]
    fn test_echo_applet_returns_command_data() {
        let resp = EchoApplet.process(&CommandApdu::from_hex("8001000003AABBCC").unwrap());
        assert_eq!(resp.to_bytes(), vec![0xAA, 0xBB, 0xCC, 0x90, 0x00]);
    }

    #[test]
    fn test_demo_hooks_only_touch_simulated_cards() {
        // Arrange
        let sim = ConnectionKey::shared(CardType::Simulated, 0);
        let card = ConnectionKey::shared(CardType::Physical, 0);
        let mut sim_cfg = TransportConfig::new(CardType::Simulated, 0);
        let mut card_cfg = TransportConfig::new(CardType::Physical, 0);

        // Act
        DemoHooks.configure(&sim, &mut sim_cfg);
        DemoHooks.configure(&card, &mut card_cfg);

        // Assert
        let aids: Vec<_> = sim_cfg.applets.iter().map(|i| i.aid().to_vec()).collect();
        assert_eq!(aids, vec![RANDOM_APPLET_AID.to_vec(), ECHO_APPLET_AID.to_vec()]);
        assert!(card_cfg.applets.is_empty());
        assert_eq!(sim_cfg.aid, None, "nothing is auto-selected");
    }
}
