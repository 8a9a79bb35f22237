//! Domain entities for the gateway.
//!
//! Pure types with no I/O.  The one concept every other layer shares is the
//! [`ConnectionKey`](key::ConnectionKey): the identity under which the server
//! pools a live card connection.

/// Card type and connection identity.
pub mod key;
