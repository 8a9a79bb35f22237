//! Length-field normalization.
//!
//! Some cards (and some PC/SC driver stacks) mishandle the length bytes of
//! otherwise valid commands:
//!
//! - A case-1 command (`CLA INS P1 P2`, four bytes) is rejected unless it is
//!   padded with a trailing `00`, so the normalizer synthesizes `Le = 00`.
//! - Some firmware needs an explicit `Le` on commands that carry data, so the
//!   normalizer can force one.
//!
//! Both fixes are toggled per deployment through [`ApduFixups`].  Applying the
//! normalizer twice gives the same bytes as applying it once.

use serde::{Deserialize, Serialize};

use super::command::CommandApdu;

/// Default `Le` forced by the expected-length fix.
pub const DEFAULT_EXPECTED_LENGTH: u8 = 0xFF;

/// Deployment toggles for [`normalize`].
///
/// | Field                 | Default |
/// |-----------------------|---------|
/// | `fix_length_field`    | `true`  |
/// | `fix_expected_length` | `false` |
/// | `expected_length`     | `0xFF`  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApduFixups {
    /// Pad zero-data commands with `Le = 00` so they are five bytes long.
    pub fix_length_field: bool,
    /// Force `Le` on commands that carry data.
    pub fix_expected_length: bool,
    /// The `Le` value forced by `fix_expected_length`.
    pub expected_length: u8,
}

impl Default for ApduFixups {
    fn default() -> Self {
        Self {
            fix_length_field: true,
            fix_expected_length: false,
            expected_length: DEFAULT_EXPECTED_LENGTH,
        }
    }
}

impl ApduFixups {
    /// Fixups that leave every command untouched.
    pub fn disabled() -> Self {
        Self {
            fix_length_field: false,
            fix_expected_length: false,
            expected_length: DEFAULT_EXPECTED_LENGTH,
        }
    }
}

/// Applies the enabled fixups to `cmd`.
pub fn normalize(cmd: &CommandApdu, fixups: &ApduFixups) -> CommandApdu {
    let mut out = cmd.clone();
    if out.data.is_empty() {
        if fixups.fix_length_field && out.le.is_none() {
            out.le = Some(0x00);
        }
    } else if fixups.fix_expected_length {
        out.le = Some(fixups.expected_length);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
