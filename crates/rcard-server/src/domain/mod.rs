//! Domain layer: gateway configuration types.
//!
//! Plain data, no I/O.  The infrastructure layer fills these structs from the
//! command line and the optional TOML file; everything else only reads them.

pub mod config;

pub use config::{ActionPolicy, GatewayConfig, RelayEndpoint, DEFAULT_RELAY_PORT};
