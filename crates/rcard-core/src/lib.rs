//! # rcard-core
//!
//! Shared library for the rcard smart-card gateway containing the APDU model,
//! the connection-key domain types and the JSON action protocol spoken by both
//! network front-ends.
//!
//! This crate has no dependencies on sockets, reader drivers or async
//! runtimes.  Everything here is plain data plus pure functions, so it can be
//! unit-tested without a card reader attached.
//!
//! # Architecture overview (for beginners)
//!
//! A smart card talks in *APDUs* (Application Protocol Data Units): small
//! byte strings made of a 4-byte header (`CLA INS P1 P2`), an optional data
//! field and an optional "expected length" byte.  The card answers with some
//! data followed by a two-byte *status word* (`90 00` means success).
//!
//! The gateway lets remote clients send APDUs to cards they cannot touch.
//! This crate defines:
//!
//! - **`domain`** – How a client names a card: a [`ConnectionKey`] made of the
//!   card type (physical reader, simulator or remote relay), a reader index
//!   and, for simulators only, an optional session token.
//!
//! - **`apdu`** – Parsing and building command/response APDUs plus the
//!   length-field normalizer that works around buggy card firmware.
//!
//! - **`protocol`** – The JSON request/response objects exchanged over
//!   WebSocket and REST, the closed set of supported actions and the error
//!   taxonomy reported back to clients.

pub mod apdu;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rcard_core::ConnectionKey` instead of `rcard_core::domain::key::ConnectionKey`.
pub use apdu::command::{ApduError, CommandApdu};
pub use apdu::normalize::{normalize, ApduFixups};
pub use apdu::response::ResponseApdu;
pub use domain::key::{CardType, ConnectionKey, MAX_READER_INDEX};
pub use protocol::error::GatewayError;
pub use protocol::messages::{ActionKind, ActionRequest, ActionResponse};
