//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments and an optional TOML file
//! (production) or from defaults (local development and tests).
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct, with no environment reads inside
//! the domain, makes the gateway easy to embed in tests.  The infrastructure
//! layer is responsible for populating it.

use std::net::SocketAddr;
use std::time::Duration;

use rcard_core::ApduFixups;

/// Base TCP port of a vsmartcard `vpcd` relay; reader `n` listens on base + n.
pub const DEFAULT_RELAY_PORT: u16 = 35963;

/// What clients are allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPolicy {
    /// Honour the `shutdown` action.
    pub allow_terminate: bool,
    /// Honour the request's `idx` field.
    pub allow_pick_reader: bool,
    /// Reader index used when the request does not pick one.
    pub default_reader_index: u32,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            allow_terminate: false,
            allow_pick_reader: false,
            default_reader_index: 0,
        }
    }
}

/// Address of a remote relay peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub host: String,
    /// Port of reader index 0.
    pub port: u16,
}

impl RelayEndpoint {
    /// The `host:port` string for `reader_index`.
    ///
    /// Returns `None` when the index would push the port past `u16::MAX`.
    pub fn address_for(&self, reader_index: u32) -> Option<String> {
        let offset = u16::try_from(reader_index).ok()?;
        let port = self.port.checked_add(offset)?;
        Some(format!("{}:{}", self.host, port))
    }
}

/// All runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket listener address.
    pub ws_bind_addr: SocketAddr,

    /// REST listener address.
    pub rest_bind_addr: SocketAddr,

    /// Interval between server pings on each WebSocket session.
    pub ping_interval: Duration,

    /// How long a session may go without answering a ping.
    pub pong_timeout: Duration,

    /// Per-request deadline of the REST front-end.
    pub request_timeout: Duration,

    /// Size of the blocking card-I/O worker pool.
    pub workers: usize,

    /// Delay between an accepted `shutdown` action and the actual shutdown.
    pub shutdown_grace: Duration,

    pub policy: ActionPolicy,

    /// APDU length-field quirk fixing.
    pub fixups: ApduFixups,

    /// Substring of the physical reader name to prefer over the index.
    pub reader_hint: Option<String>,

    /// Relay used for `"remote"` targets; `None` disables them.
    pub relay: Option<RelayEndpoint>,

    /// Install the demo applets into simulated cards.
    pub demo_applets: bool,
}

impl Default for GatewayConfig {
    /// | Field             | Default          |
    /// |-------------------|------------------|
    /// | ws_bind_addr      | `0.0.0.0:9900`   |
    /// | rest_bind_addr    | `0.0.0.0:9901`   |
    /// | ping_interval     | 10 seconds       |
    /// | pong_timeout      | 15 seconds       |
    /// | request_timeout   | 5 seconds        |
    /// | workers           | 5                |
    /// | shutdown_grace    | 1 second         |
    /// | policy            | nothing allowed, reader 0 |
    /// | fixups            | length fix on, Le fix off |
    /// | reader_hint       | none             |
    /// | relay             | none             |
    /// | demo_applets      | `true`           |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 9900)),
            rest_bind_addr: SocketAddr::from(([0, 0, 0, 0], 9901)),
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
            workers: 5,
            shutdown_grace: Duration::from_secs(1),
            policy: ActionPolicy::default(),
            fixups: ApduFixups::default(),
            reader_hint: None,
            relay: None,
            demo_applets: true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
