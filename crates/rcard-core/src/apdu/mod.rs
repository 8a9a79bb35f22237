//! APDU model: command parsing/building, response splitting and the
//! length-field normalizer.
//!
//! # Wire layout (for beginners)
//!
//! ISO 7816-4 short command APDUs come in four shapes ("cases"):
//!
//! ```text
//! case 1:  CLA INS P1 P2                      no data, no answer data
//! case 2:  CLA INS P1 P2 Le                   no data, answer expected
//! case 3:  CLA INS P1 P2 Lc <data>            data, no answer data
//! case 4:  CLA INS P1 P2 Lc <data> Le         data, answer expected
//! ```
//!
//! `Lc` is the number of data bytes (1..=255) and `Le` the maximum number of
//! answer bytes (`00` means 256).  Extended-length APDUs are not supported.
//!
//! A response APDU is `<data> SW1 SW2`.

/// Command APDU parsing and building.
pub mod command;

/// Length-field normalization for buggy card firmware.
pub mod normalize;

/// Response APDU splitting.
pub mod response;
